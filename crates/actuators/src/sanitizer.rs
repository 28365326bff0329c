//! Non-finite actuator values are replaced before anything is published

use metrics::counter;
use thiserror::Error;
use tracing::error;

use crate::command::Actuators;

/// An actuator field that was not a finite number
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("actuators.{field} not finite: {value}")]
pub struct NonFiniteField {
    pub field: &'static str,
    pub value: f32,
}

/// Replaces non-finite actuator values with zero
#[derive(Debug, Clone, Copy, Default)]
pub struct ActuatorSanitizer;

impl ActuatorSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Zero every non-finite field, returning what was replaced.
    ///
    /// Each replacement is logged together with the command as it was
    /// before sanitation.
    pub fn sanitize(&self, actuators: &mut Actuators) -> Vec<NonFiniteField> {
        let original = *actuators;
        let mut replaced = Vec::new();

        for (field, value) in actuators.fields_mut() {
            if value.is_finite() {
                continue;
            }
            let fault = NonFiniteField {
                field,
                value: *value,
            };
            *value = 0.0;

            // non-finite floats serialize as null
            let payload = serde_json::to_string(&original).unwrap_or_default();
            error!(field, %payload, "{}", fault);
            counter!("supervisor_sanitized_fields_total", "field" => field).increment(1);
            replaced.push(fault);
        }

        replaced
    }
}
