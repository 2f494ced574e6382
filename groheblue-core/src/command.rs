//! Appliance commands and their wire representation.
//!
//! A command is a typed [`CommandAction`] addressed to one appliance. It is
//! validated locally before anything is sent, then rendered into the
//! [`CommandEnvelope`] the cloud API expects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ApplianceId;

/// Dispensed amounts must be a multiple of this many millilitres.
pub const AMOUNT_STEP_ML: u32 = 50;

/// Largest amount a single command may dispense.
pub const MAX_AMOUNT_ML: u32 = 2000;

/// A command that must not be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing to dispense.
    #[error("amount must be greater than 0 ml")]
    ZeroAmount,

    /// The amount is not a multiple of 50 ml.
    #[error("amount {amount_ml} ml is not a multiple of 50 ml")]
    NotAMultiple { amount_ml: u32 },

    /// The amount exceeds the per-command maximum.
    #[error("amount {amount_ml} ml exceeds the 2000 ml maximum")]
    TooLarge { amount_ml: u32 },

    /// The tap type is not one of still, medium or sparkling.
    #[error("unknown tap type '{value}', expected still, medium or sparkling (1-3)")]
    UnknownTapType { value: String },

    /// The maintenance action name is not recognized.
    #[error("unknown maintenance action '{value}'")]
    UnknownAction { value: String },

    /// The command does not name an appliance.
    #[error("appliance id must not be empty")]
    EmptyApplianceId,
}

/// Kind of water to dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapType {
    /// Still water.
    Still,
    /// Medium carbonated water.
    Medium,
    /// Sparkling water.
    Sparkling,
}

impl TapType {
    /// Numeric code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Still => 1,
            Self::Medium => 2,
            Self::Sparkling => 3,
        }
    }
}

impl TryFrom<u8> for TapType {
    type Error = ValidationError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Still),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Sparkling),
            other => Err(ValidationError::UnknownTapType {
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for TapType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "still" | "1" => Ok(Self::Still),
            "medium" | "2" => Ok(Self::Medium),
            "sparkling" | "carbonated" | "3" => Ok(Self::Sparkling),
            _ => Err(ValidationError::UnknownTapType {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Still => "still",
            Self::Medium => "medium",
            Self::Sparkling => "sparkling",
        };
        f.write_str(name)
    }
}

/// Maintenance operations beyond dispensing.
///
/// Factory reset is deliberately not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceAction {
    /// Acknowledge a replaced CO2 cylinder.
    ResetCo2Status,
    /// Acknowledge a replaced filter.
    ResetFilterStatus,
    /// Start the cleaning program.
    StartCleaning,
    /// Ask the appliance to report fresh measurements.
    RequestMeasurement,
    /// Withdraw a pending flush confirmation.
    RevokeFlushConfirmation,
    /// Run the automatic flush.
    RunAutoFlush,
}

impl FromStr for MaintenanceAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset-co2" => Ok(Self::ResetCo2Status),
            "reset-filter" => Ok(Self::ResetFilterStatus),
            "clean" => Ok(Self::StartCleaning),
            "measure" => Ok(Self::RequestMeasurement),
            "revoke-flush" => Ok(Self::RevokeFlushConfirmation),
            "auto-flush" => Ok(Self::RunAutoFlush),
            _ => Err(ValidationError::UnknownAction {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MaintenanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResetCo2Status => "reset-co2",
            Self::ResetFilterStatus => "reset-filter",
            Self::StartCleaning => "clean",
            Self::RequestMeasurement => "measure",
            Self::RevokeFlushConfirmation => "revoke-flush",
            Self::RunAutoFlush => "auto-flush",
        };
        f.write_str(name)
    }
}

/// What a command asks the appliance to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Dispense `amount_ml` of `tap_type` water.
    Dispense { tap_type: TapType, amount_ml: u32 },

    /// Run a maintenance operation.
    Maintenance(MaintenanceAction),
}

impl CommandAction {
    /// Check the action's parameters without sending anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Self::Dispense { amount_ml, .. } => validate_amount(amount_ml),
            Self::Maintenance(_) => Ok(()),
        }
    }

    /// Render the action as the wire command object.
    pub fn flags(&self) -> CommandFlags {
        let mut flags = CommandFlags::default();
        match *self {
            Self::Dispense {
                tap_type,
                amount_ml,
            } => {
                flags.tap_type = tap_type.code();
                flags.tap_amount = amount_ml;
            }
            Self::Maintenance(MaintenanceAction::ResetCo2Status) => flags.co2_status_reset = true,
            Self::Maintenance(MaintenanceAction::ResetFilterStatus) => {
                flags.filter_status_reset = true
            }
            Self::Maintenance(MaintenanceAction::StartCleaning) => flags.cleaning_mode = true,
            Self::Maintenance(MaintenanceAction::RequestMeasurement) => {
                flags.get_current_measurement = true
            }
            Self::Maintenance(MaintenanceAction::RevokeFlushConfirmation) => {
                flags.revoke_flush_confirmation = true
            }
            Self::Maintenance(MaintenanceAction::RunAutoFlush) => flags.exec_auto_flush = true,
        }
        flags
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispense {
                tap_type,
                amount_ml,
            } => write!(f, "dispense {amount_ml} ml {tap_type}"),
            Self::Maintenance(action) => write!(f, "{action}"),
        }
    }
}

fn validate_amount(amount_ml: u32) -> Result<(), ValidationError> {
    if amount_ml == 0 {
        return Err(ValidationError::ZeroAmount);
    }
    if amount_ml % AMOUNT_STEP_ML != 0 {
        return Err(ValidationError::NotAMultiple { amount_ml });
    }
    if amount_ml > MAX_AMOUNT_ML {
        return Err(ValidationError::TooLarge { amount_ml });
    }
    Ok(())
}

/// A command addressed to one appliance.
///
/// # Examples
///
/// ```
/// use groheblue_core::{ApplianceCommand, TapType};
///
/// let command = ApplianceCommand::dispense("appliance-1", TapType::Sparkling, 250);
/// assert!(command.validate().is_ok());
///
/// let invalid = ApplianceCommand::dispense("appliance-1", TapType::Still, 1730);
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceCommand {
    appliance_id: ApplianceId,
    action: CommandAction,
}

impl ApplianceCommand {
    /// Create a command for `appliance_id`.
    pub fn new(appliance_id: impl Into<ApplianceId>, action: CommandAction) -> Self {
        Self {
            appliance_id: appliance_id.into(),
            action,
        }
    }

    /// Dispense `amount_ml` of `tap_type` water.
    pub fn dispense(appliance_id: impl Into<ApplianceId>, tap_type: TapType, amount_ml: u32) -> Self {
        Self::new(
            appliance_id,
            CommandAction::Dispense {
                tap_type,
                amount_ml,
            },
        )
    }

    /// Run a maintenance operation.
    pub fn maintenance(appliance_id: impl Into<ApplianceId>, action: MaintenanceAction) -> Self {
        Self::new(appliance_id, CommandAction::Maintenance(action))
    }

    /// Target appliance.
    pub fn appliance_id(&self) -> &ApplianceId {
        &self.appliance_id
    }

    /// Requested action.
    pub fn action(&self) -> &CommandAction {
        &self.action
    }

    /// Check the command without sending anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.appliance_id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyApplianceId);
        }
        self.action.validate()
    }

    /// Render the request body for the command endpoint.
    pub fn envelope(&self) -> CommandEnvelope {
        CommandEnvelope {
            kind: None,
            appliance_id: self.appliance_id.as_str().to_string(),
            command: self.action.flags(),
            commandb64: None,
            timestamp: None,
        }
    }
}

/// Command object inside the request body.
///
/// Field order matches what the appliance firmware sends itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFlags {
    pub co2_status_reset: bool,
    pub tap_type: u8,
    pub cleaning_mode: bool,
    pub filter_status_reset: bool,
    pub get_current_measurement: bool,
    pub tap_amount: u32,
    pub factory_reset: bool,
    pub revoke_flush_confirmation: bool,
    pub exec_auto_flush: bool,
}

/// Request body of the command endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub appliance_id: String,
    pub command: CommandFlags,
    pub commandb64: Option<String>,
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sparkling_envelope_matches_wire_format() {
        let command = ApplianceCommand::dispense("appliance-1", TapType::Sparkling, 250);
        let body = serde_json::to_value(command.envelope()).unwrap();

        assert_eq!(
            body,
            json!({
                "type": null,
                "appliance_id": "appliance-1",
                "command": {
                    "co2_status_reset": false,
                    "tap_type": 3,
                    "cleaning_mode": false,
                    "filter_status_reset": false,
                    "get_current_measurement": false,
                    "tap_amount": 250,
                    "factory_reset": false,
                    "revoke_flush_confirmation": false,
                    "exec_auto_flush": false
                },
                "commandb64": null,
                "timestamp": null
            })
        );
    }

    #[test]
    fn test_envelope_field_order() {
        let command = ApplianceCommand::dispense("a", TapType::Still, 50);
        let text = serde_json::to_string(&command.envelope()).unwrap();
        assert!(text.starts_with(r#"{"type":null,"appliance_id":"a","command":{"co2_status_reset":false,"tap_type":1,"#));
        assert!(text.ends_with(r#""commandb64":null,"timestamp":null}"#));
    }

    #[test]
    fn test_maintenance_sets_single_flag() {
        let flags = CommandAction::Maintenance(MaintenanceAction::ResetFilterStatus).flags();
        assert!(flags.filter_status_reset);
        assert_eq!(
            flags,
            CommandFlags {
                filter_status_reset: true,
                ..CommandFlags::default()
            }
        );
        assert!(!flags.factory_reset);
    }

    #[test]
    fn test_amount_validation() {
        let valid = [50, 250, 1000, 2000];
        for amount in valid {
            assert!(validate_amount(amount).is_ok(), "{amount} should be valid");
        }

        assert_eq!(validate_amount(0), Err(ValidationError::ZeroAmount));
        assert_eq!(
            validate_amount(1730),
            Err(ValidationError::NotAMultiple { amount_ml: 1730 })
        );
        assert_eq!(
            validate_amount(2050),
            Err(ValidationError::TooLarge { amount_ml: 2050 })
        );
    }

    #[test]
    fn test_empty_appliance_id_rejected() {
        let command = ApplianceCommand::dispense("  ", TapType::Still, 100);
        assert_eq!(command.validate(), Err(ValidationError::EmptyApplianceId));
    }

    #[test]
    fn test_tap_type_parsing() {
        assert_eq!("Sparkling".parse::<TapType>().unwrap(), TapType::Sparkling);
        assert_eq!("2".parse::<TapType>().unwrap(), TapType::Medium);
        assert_eq!(TapType::try_from(1).unwrap(), TapType::Still);
        assert!(TapType::try_from(4).is_err());
        assert!("fizzy".parse::<TapType>().is_err());
    }

    #[test]
    fn test_maintenance_action_round_trips_through_display() {
        let actions = [
            MaintenanceAction::ResetCo2Status,
            MaintenanceAction::ResetFilterStatus,
            MaintenanceAction::StartCleaning,
            MaintenanceAction::RequestMeasurement,
            MaintenanceAction::RevokeFlushConfirmation,
            MaintenanceAction::RunAutoFlush,
        ];
        for action in actions {
            assert_eq!(action.to_string().parse::<MaintenanceAction>().unwrap(), action);
        }
    }
}
