//! Simulated Sensor Node Example
//!
//! Runs a two-channel sensor module for a few simulated seconds: samples are
//! averaged into records, reported once per second, calibrated, and finally
//! downloaded as CSV through small chunk buffers.
//!
//! ## What You'll Learn
//!
//! - Setting up a `SensorModule` with a fixed-size record store
//! - Driving it from a `RunLoop` with a time source
//! - Running an offset calibration
//! - Streaming the history with `fill_csv` and buffers that are too small
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example sensor_node
//! ```

use fieldnode_core::calibration::NullCalibrationStore;
use fieldnode_core::config::SensorConfig;
use fieldnode_core::logger::{LogSink, Logger, LoggerConfig};
use fieldnode_core::runloop::RunLoop;
use fieldnode_core::serializer::PLACEHOLDER;
use fieldnode_core::time::{MockTimeSource, TimeSource};
use fieldnode_core::{Capacity, SensorModule};

/// Console on stdout
struct Stdout;

impl LogSink for Stdout {
    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// Raw ADC counts of a slowly rising temperature and a sawtooth pressure
fn adc(t: u32) -> [i32; 2] {
    [2_000 + (t / 100) as i32, 500 + ((t / 10) % 50) as i32]
}

fn main() {
    println!("FieldNode Sensor Node Example");
    println!("=============================\n");

    let mut log = Logger::new(LoggerConfig::default()).with_console(Stdout);
    let time = MockTimeSource::new(0);
    let mut flash = NullCalibrationStore;

    let config = SensorConfig {
        sample_averaging: 10,
        calibration_averaging: 20,
        reporting_interval_ms: 1000,
        storage: Capacity::fixed(8).unwrap_or(Capacity::Adaptive),
        info_name: "Demo node".into(),
        channel_types: vec!["Temperature".into(), "Pressure".into()],
        channel_units: vec!["counts".into(), "counts".into()],
        ..SensorConfig::with_channels(2)
    };
    let mut sensor = SensorModule::setup(config, time.now(), &mut flash, &mut log);
    let mut node = RunLoop::new();

    // 3 s of samples every 10 ms, network up after 200 ms
    for _ in 0..300 {
        time.advance(10);
        let now = time.now();
        if let Err(err) = sensor.add_sample(now, &adc(now), &mut flash, &mut log) {
            println!("sample rejected: {}", err);
        }
        node.tick(&time, now > 200, &mut sensor, &mut log);
    }

    println!("\nOffset calibration");
    if let Err(err) = sensor.measure_offset(time.now(), &mut log) {
        println!("not started: {}", err);
    }
    // 20 samples for the measurement, 10 more for the next record
    for _ in 0..30 {
        time.advance(10);
        let now = time.now();
        let _ = sensor.add_sample(now, &adc(now), &mut flash, &mut log);
    }
    println!("Newest raw:    {:?}", sensor.current_raw());
    println!("Newest scaled: {:?}", sensor.current_scaled().as_deref());

    println!("\nChannels");
    for channel in sensor.channel_details() {
        println!(
            "  #{} {} [{}] offset {} scaling {}",
            channel.number, channel.kind, channel.unit, channel.calibration.offset, channel.calibration.scaling
        );
    }
    if let Some(status) = sensor.status() {
        println!("Store: {}", status);
    }

    println!("\nCSV download with 6 and 24 byte buffers");
    let mut body = Vec::new();
    let (mut chunks, mut retries) = (0, 0);
    for size in [6usize, 24].into_iter().cycle() {
        let mut buf = vec![0u8; size];
        let n = sensor.fill_csv(&mut buf, body.len());
        if n == 0 {
            break;
        }
        if n == 1 && buf[0] == PLACEHOLDER {
            retries += 1;
            continue;
        }
        chunks += 1;
        body.extend_from_slice(&buf[..n]);
    }
    println!("{} chunks, {} retries:\n{}", chunks, retries, String::from_utf8_lossy(&body));

    let stats = node.stats();
    println!("Loop mean {} ms, min {} ms, max {} ms", stats.mean_ms, stats.min_ms, stats.max_ms);
}
