//! Web form actions
//!
//! A form post arrives as an ordered list of `(key, value)` pairs. The first
//! key names the action; a form whose first key is not an action name is a
//! settings form and every pair is one setting.
//!
//! | first key         | further arguments                  | reply                                              |
//! |-------------------|------------------------------------|----------------------------------------------------|
//! | `measure_offset`  |                                    | `Measuring offset, this may take a few seconds ...`  |
//! | `measure_scaling` | `channel_number`, `target_value`   | `Measuring scaling, this may take a few seconds ...` |
//! | `reset_offset`    |                                    | `Offset reset.`                                    |
//! | `reset_scaling`   |                                    | `Scaling reset.`                                   |
//! | anything else     | more settings                      | `Settings saved.`                                  |

use fieldnode_core::calibration::StartOutcome;
use fieldnode_core::logger::{Level, Logger, LoggerConfig};
use fieldnode_core::time::Timestamp;
use fieldnode_core::{SensorError, SensorModule};
use thiserror::Error;

use crate::persist::{FlashBackend, JsonStore, PersistError};

/// Keys handled by the logger instead of the sensor module
pub const LOGGER_KEYS: [&str; 3] = ["level", "target", "ansi_color"];

/// Prefix of per-channel display exponent settings, e.g. `exponent_2`
pub const EXPONENT_PREFIX: &str = "exponent_";

/// Errors returned to the web layer
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("Invalid value '{value}' for '{name}'")]
    InvalidArgument { name: String, value: String },

    #[error("Offset/Scaling measurement already running")]
    CalibrationRunning,

    #[error("{0}")]
    Rejected(SensorError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl From<SensorError> for ActionError {
    fn from(err: SensorError) -> Self {
        ActionError::Rejected(err)
    }
}

/// One parsed form submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MeasureOffset,
    MeasureScaling { channel_number: u16, target_value: i32 },
    ResetOffset,
    ResetScaling,
    SaveSettings(Vec<(String, String)>),
}

impl Action {
    /// Parse form arguments in submission order
    pub fn parse(args: &[(&str, &str)]) -> Result<Self, ActionError> {
        let Some(&(name, _)) = args.first() else {
            return Err(ActionError::MissingArgument("action"));
        };
        let action = match name {
            "measure_offset" => Action::MeasureOffset,
            "measure_scaling" => Action::MeasureScaling {
                channel_number: argument(args, "channel_number")?,
                target_value: argument(args, "target_value")?,
            },
            "reset_offset" => Action::ResetOffset,
            "reset_scaling" => Action::ResetScaling,
            _ => Action::SaveSettings(args.iter().map(|&(k, v)| (k.to_string(), v.to_string())).collect()),
        };
        Ok(action)
    }

    /// Message shown to the user on success
    pub fn success_message(&self) -> &'static str {
        match self {
            Action::MeasureOffset => "Measuring offset, this may take a few seconds ...",
            Action::MeasureScaling { .. } => "Measuring scaling, this may take a few seconds ...",
            Action::ResetOffset => "Offset reset.",
            Action::ResetScaling => "Scaling reset.",
            Action::SaveSettings(_) => "Settings saved.",
        }
    }
}

fn argument<T: std::str::FromStr>(args: &[(&str, &str)], name: &'static str) -> Result<T, ActionError> {
    let (_, value) = args.iter().find(|(key, _)| *key == name).ok_or(ActionError::MissingArgument(name))?;
    value
        .trim()
        .parse()
        .map_err(|_| ActionError::InvalidArgument { name: name.to_string(), value: value.to_string() })
}

/// Everything an action may touch
pub struct ActionContext<'a, B> {
    pub sensor: &'a mut SensorModule,
    pub log: &'a mut Logger,
    pub store: &'a mut JsonStore<B>,
}

impl<B: FlashBackend> ActionContext<'_, B> {
    /// Run `action`, returning the user message
    pub fn execute(&mut self, action: &Action, now: Timestamp) -> Result<&'static str, ActionError> {
        match action {
            Action::MeasureOffset => started(self.sensor.measure_offset(now, self.log)?)?,
            Action::MeasureScaling { channel_number, target_value } => {
                started(self.sensor.measure_scaling(*channel_number, *target_value, now, self.log)?)?
            }
            Action::ResetOffset => self.sensor.reset_offset(now, self.store, self.log)?,
            Action::ResetScaling => self.sensor.reset_scaling(now, self.store, self.log)?,
            Action::SaveSettings(settings) => self.save_settings(settings, now)?,
        }
        Ok(action.success_message())
    }

    /// Parse and run one form submission
    pub fn handle(&mut self, args: &[(&str, &str)], now: Timestamp) -> Result<&'static str, ActionError> {
        let action = Action::parse(args)?;
        let result = self.execute(&action, now);
        if let Err(err) = &result {
            self.log.write(Level::Warning, now, format_args!("Action failed: {}.", err));
        }
        result
    }

    /// Apply settings in order, then persist whatever changed
    ///
    /// Settings before a rejected one stay applied and are saved.
    fn save_settings(&mut self, settings: &[(String, String)], now: Timestamp) -> Result<(), ActionError> {
        let mut logger_config: LoggerConfig = *self.log.config();
        let mut sensor_changed = false;
        let mut failure = None;

        for (key, value) in settings {
            let applied = if LOGGER_KEYS.contains(&key.as_str()) {
                logger_config.apply(key, value).map_err(ActionError::from)
            } else if let Some(number) = key.strip_prefix(EXPONENT_PREFIX) {
                self.set_exponent(number, value, now)
            } else {
                sensor_changed = true;
                self.sensor.update_setting(key, value, now).map_err(ActionError::from)
            };
            if let Err(err) = applied {
                failure = Some(err);
                break;
            }
        }

        if logger_config != *self.log.config() {
            self.log.set_config(logger_config);
            self.store.write(&logger_config)?;
        }
        if sensor_changed {
            self.store.write(self.sensor.config())?;
        }
        failure.map_or(Ok(()), Err)
    }

    fn set_exponent(&mut self, number: &str, value: &str, now: Timestamp) -> Result<(), ActionError> {
        let invalid = || ActionError::InvalidArgument {
            name: format!("{}{}", EXPONENT_PREFIX, number),
            value: value.to_string(),
        };
        let channel: u16 = number.parse().map_err(|_| invalid())?;
        let exponent: i8 = value.trim().parse().map_err(|_| invalid())?;
        self.sensor.set_exponent(channel, exponent, now, self.store, self.log)?;
        Ok(())
    }
}

fn started(outcome: StartOutcome) -> Result<(), ActionError> {
    match outcome {
        StartOutcome::Started => Ok(()),
        StartOutcome::AlreadyRunning => Err(ActionError::CalibrationRunning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_calibration_actions() {
        assert_eq!(Action::parse(&[("measure_offset", "")]).unwrap(), Action::MeasureOffset);
        assert_eq!(
            Action::parse(&[("measure_scaling", ""), ("channel_number", "2"), ("target_value", "-500")]).unwrap(),
            Action::MeasureScaling { channel_number: 2, target_value: -500 }
        );
        assert_eq!(Action::parse(&[("reset_scaling", "")]).unwrap().success_message(), "Scaling reset.");
    }

    #[test]
    fn scaling_needs_both_arguments() {
        assert!(matches!(
            Action::parse(&[("measure_scaling", ""), ("channel_number", "1")]),
            Err(ActionError::MissingArgument("target_value"))
        ));
        assert!(matches!(
            Action::parse(&[("measure_scaling", ""), ("channel_number", "x"), ("target_value", "1")]),
            Err(ActionError::InvalidArgument { name, .. }) if name == "channel_number"
        ));
        assert!(matches!(Action::parse(&[]), Err(ActionError::MissingArgument("action"))));
    }

    #[test]
    fn other_forms_are_settings() {
        let action = Action::parse(&[("sample_averaging", "5"), ("level", "2")]).unwrap();
        assert_eq!(
            action,
            Action::SaveSettings(vec![
                ("sample_averaging".to_string(), "5".to_string()),
                ("level".to_string(), "2".to_string()),
            ])
        );
    }
}
