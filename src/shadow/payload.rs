//! Shadow document bodies.
//!
//! Outbound bodies are always `{"state":{"reported":{...}}}` carrying only the
//! fields an intent names. Temperature and humidity go out with one decimal,
//! light as a whole number.
//!
//! Inbound decoding is schema-checked on the envelope and lenient per field:
//! a missing or malformed envelope is an error, while a missing or wrong-typed
//! field inside `reported` just decodes to `None` and is left alone.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    directory::{FieldValue, ThingRecord},
    dispatch::PublishIntent,
    Error, Result,
};

/// Body sent with a shadow get request.
pub const GET_PAYLOAD: &[u8] = b"{}";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed shadow document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Fields of a `reported` object. Outbound, absent fields are omitted;
/// inbound, absent or unusable fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reported {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "one_decimal",
        deserialize_with = "lenient_f32"
    )]
    pub temperature: Option<f32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "one_decimal",
        deserialize_with = "lenient_f32"
    )]
    pub humidity: Option<f32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "whole_number",
        deserialize_with = "lenient_f32"
    )]
    pub light: Option<f32>,
    #[serde(
        default,
        rename = "weatherAlert",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_bool"
    )]
    pub weather_alert: Option<bool>,
    #[serde(
        default,
        rename = "IPAddress",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub ip_address: Option<String>,
}

impl Reported {
    /// The slice of `record` an intent publishes. `Get` carries no state.
    pub fn for_intent(intent: PublishIntent, record: &ThingRecord) -> Option<Self> {
        let mut reported = Reported::default();
        match intent {
            PublishIntent::Weather => {
                reported.temperature = Some(record.temp);
                reported.humidity = Some(record.humidity);
                reported.light = Some(record.light);
                reported.weather_alert = Some(record.alert);
            }
            PublishIntent::Temperature => reported.temperature = Some(record.temp),
            PublishIntent::Humidity => reported.humidity = Some(record.humidity),
            PublishIntent::Light => reported.light = Some(record.light),
            PublishIntent::Alert => reported.weather_alert = Some(record.alert),
            PublishIntent::Ip => reported.ip_address = Some(record.ip_str.clone()),
            PublishIntent::Get(_) => return None,
        }
        Some(reported)
    }

    /// Present fields as directory writes, in a fixed order.
    pub fn field_values(&self) -> Vec<FieldValue> {
        let mut fields = Vec::with_capacity(5);
        if let Some(ip) = &self.ip_address {
            fields.push(FieldValue::Ip(ip.clone()));
        }
        if let Some(v) = self.temperature {
            fields.push(FieldValue::Temperature(v));
        }
        if let Some(v) = self.humidity {
            fields.push(FieldValue::Humidity(v));
        }
        if let Some(v) = self.light {
            fields.push(FieldValue::Light(v));
        }
        if let Some(on) = self.weather_alert {
            fields.push(FieldValue::Alert(on));
        }
        fields
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDoc {
    reported: Reported,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShadowDoc {
    state: StateDoc,
}

#[derive(Debug, Deserialize)]
struct DocumentsDoc {
    current: ShadowDoc,
}

/// Serialize `{"state":{"reported":...}}`.
pub fn encode_reported(reported: &Reported) -> Result<Vec<u8>> {
    let doc = ShadowDoc {
        state: StateDoc {
            reported: reported.clone(),
        },
    };
    serde_json::to_vec(&doc).map_err(|e| Error::Parse(format!("encode shadow document: {e}")))
}

/// Payload for an intent: a reported document, or `{}` for a get.
pub fn encode_intent(intent: PublishIntent, record: &ThingRecord) -> Result<Vec<u8>> {
    match Reported::for_intent(intent, record) {
        Some(reported) => encode_reported(&reported),
        None => Ok(GET_PAYLOAD.to_vec()),
    }
}

/// Decode a `get/accepted` body: `{"state":{"reported":{...}}}`.
pub fn decode_get_accepted(payload: &[u8]) -> std::result::Result<Reported, DecodeError> {
    let doc: ShadowDoc = serde_json::from_slice(payload)?;
    Ok(doc.state.reported)
}

/// Decode an `update/documents` body: `{"current":{"state":{"reported":{...}}}}`.
pub fn decode_update_documents(payload: &[u8]) -> std::result::Result<Reported, DecodeError> {
    let doc: DocumentsDoc = serde_json::from_slice(payload)?;
    Ok(doc.current.state.reported)
}

fn one_decimal<S: Serializer>(value: &Option<f32>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => s.serialize_f64((f64::from(*v) * 10.0).round() / 10.0),
        None => s.serialize_none(),
    }
}

fn whole_number<S: Serializer>(value: &Option<f32>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) if v.is_finite() => s.serialize_i64(f64::from(*v).round() as i64),
        _ => s.serialize_none(),
    }
}

fn lenient_f32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f32>, D::Error> {
    Ok(Value::deserialize(d)?.as_f64().map(|v| v as f32))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    Ok(Value::deserialize(d)?.as_bool())
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ThingRecord {
        ThingRecord {
            thing_number: 0,
            ip_str: "192.168.1.20".into(),
            alert: true,
            temp: 21.54,
            humidity: 40.26,
            light: 99.6,
        }
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn weather_payload_carries_rounded_fields() {
        let body = text(encode_intent(PublishIntent::Weather, &record()).unwrap());
        assert_eq!(
            body,
            r#"{"state":{"reported":{"temperature":21.5,"humidity":40.3,"light":100,"weatherAlert":true}}}"#
        );
    }

    #[test]
    fn single_field_payloads() {
        let rec = record();
        assert_eq!(
            text(encode_intent(PublishIntent::Humidity, &rec).unwrap()),
            r#"{"state":{"reported":{"humidity":40.3}}}"#
        );
        assert_eq!(
            text(encode_intent(PublishIntent::Light, &rec).unwrap()),
            r#"{"state":{"reported":{"light":100}}}"#
        );
        assert_eq!(
            text(encode_intent(PublishIntent::Ip, &rec).unwrap()),
            r#"{"state":{"reported":{"IPAddress":"192.168.1.20"}}}"#
        );
        assert_eq!(
            text(encode_intent(PublishIntent::Get(9), &rec).unwrap()),
            "{}"
        );
    }

    #[test]
    fn update_documents_reads_current_state() {
        let body = br#"{"previous":{},"current":{"state":{"reported":{"humidity":55.5,"weatherAlert":false}}}}"#;
        let reported = decode_update_documents(body).unwrap();
        assert_eq!(reported.humidity, Some(55.5));
        assert_eq!(reported.weather_alert, Some(false));
        assert_eq!(reported.temperature, None);
        assert_eq!(
            reported.field_values(),
            vec![FieldValue::Humidity(55.5), FieldValue::Alert(false)]
        );
    }

    #[test]
    fn wrong_typed_fields_are_skipped() {
        let body = br#"{"state":{"reported":{"temperature":"hot","light":12,"weatherAlert":1,"IPAddress":7}}}"#;
        let reported = decode_get_accepted(body).unwrap();
        assert_eq!(
            reported,
            Reported {
                light: Some(12.0),
                ..Reported::default()
            }
        );
    }

    #[test]
    fn missing_envelope_fails() {
        assert!(decode_get_accepted(br#"{"state":{}}"#).is_err());
        assert!(decode_get_accepted(br#"{"state":{"reported":null}}"#).is_err());
        assert!(decode_update_documents(br#"{"state":{"reported":{}}}"#).is_err());
        assert!(decode_get_accepted(b"not json").is_err());
    }
}
