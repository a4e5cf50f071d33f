// 🥑 How a summary turns into payload bytes.
//
// Without a registry the value is plain JSON. With one, it is Avro in the registry's wire
// framing: magic byte 0, the schema id as a 4-byte big-endian integer, then the Avro body.
// Consumers that deserialize through the registry read the id and fetch the schema themselves.

use std::fmt;

use anyhow::{Context, Result};
use apache_avro::Schema;
use tracing::info;

use super::schema_registry::RegisteredSchema;
use crate::common::VideoSummaryValue;
use crate::error::WatchError;

const MAGIC_BYTE: u8 = 0;

/// 🎨 The payload format chosen at startup, shared by every message of a run.
pub(crate) enum ValueEncoder {
    Json,
    Avro { schema_id: u32, schema: Schema },
}

// 🎭 the parsed schema is a wall of text nobody wants in a log line
impl fmt::Debug for ValueEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueEncoder::Json => f.write_str("Json"),
            ValueEncoder::Avro { schema_id, .. } => f.debug_struct("Avro").field("schema_id", schema_id).finish(),
        }
    }
}

impl ValueEncoder {
    /// 🔧 Parse what the registry handed back. Non-Avro subjects and unparseable schemas are
    /// config problems: nothing could be published against them anyway.
    pub(crate) fn for_registered_schema(registered: &RegisteredSchema) -> Result<Self> {
        match registered.schema_type.as_deref() {
            None => {}
            Some(schema_type) if schema_type.eq_ignore_ascii_case("AVRO") => {}
            Some(schema_type) => {
                return Err(WatchError::Config(format!(
                    "subject '{}' is registered as {schema_type}, only Avro subjects can be published to",
                    registered.subject
                ))
                .into());
            }
        }

        let schema_id = u32::try_from(registered.id).map_err(|_| {
            WatchError::Config(format!(
                "schema id {} for subject '{}' does not fit the 4-byte wire header",
                registered.id, registered.subject
            ))
        })?;
        let schema = Schema::parse_str(&registered.schema).map_err(|e| {
            WatchError::Config(format!(
                "subject '{}' version {} is not a schema we can parse: {e}",
                registered.subject, registered.version
            ))
        })?;

        info!("🥑 values will be Avro, framed with schema id {schema_id}");
        Ok(ValueEncoder::Avro { schema_id, schema })
    }

    pub(crate) fn encode(&self, value: &VideoSummaryValue) -> Result<Vec<u8>> {
        match self {
            ValueEncoder::Json => serde_json::to_vec(value).context("value is not representable as JSON"),
            ValueEncoder::Avro { schema_id, schema } => {
                // 🔀 resolve narrows our u64 counters to whatever width the schema declares
                let datum = apache_avro::to_value(value)
                    .and_then(|avro_value| avro_value.resolve(schema))
                    .context("value does not fit the registered schema")?;
                let body = apache_avro::to_avro_datum(schema, datum).context("value could not be Avro-encoded")?;

                let mut framed = Vec::with_capacity(5 + body.len());
                framed.push(MAGIC_BYTE);
                framed.extend_from_slice(&schema_id.to_be_bytes());
                framed.extend_from_slice(&body);
                Ok(framed)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use apache_avro::types::Value;

    pub(crate) const VIDEO_SUMMARY_SCHEMA: &str = r#"{
        "type": "record",
        "name": "youtube_videos_value",
        "fields": [
            { "name": "TITLE", "type": "string" },
            { "name": "VIEWS", "type": "long" },
            { "name": "LIKES", "type": "int" },
            { "name": "COMMENTS", "type": "int" }
        ]
    }"#;

    pub(crate) fn registered(id: i64, schema: &str) -> RegisteredSchema {
        RegisteredSchema {
            subject: "youtube_videos-value".to_string(),
            version: 1,
            id,
            schema: schema.to_string(),
            schema_type: None,
        }
    }

    /// 🔍 Undo the framing and decode the body, the way a registry-aware consumer would.
    pub(crate) fn decode_framed(payload: &[u8], schema: &Schema) -> (u32, Value) {
        assert_eq!(payload[0], MAGIC_BYTE, "💀 every framed payload starts with the magic byte");
        let the_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
        let mut the_body = &payload[5..];
        let the_value =
            apache_avro::from_avro_datum(schema, &mut the_body, None).expect("💀 the body should decode against the schema");
        (the_id, the_value)
    }

    fn the_value() -> VideoSummaryValue {
        VideoSummaryValue {
            title: "Rust in 100 Seconds".to_string(),
            views: 1_000_000,
            likes: 42,
            comments: 7,
        }
    }

    #[test]
    fn the_one_where_the_payload_carries_its_schema_id() -> Result<()> {
        let the_encoder = ValueEncoder::for_registered_schema(&registered(42, VIDEO_SUMMARY_SCHEMA))?;
        let the_payload = the_encoder.encode(&the_value())?;
        assert_eq!(&the_payload[..5], &[0, 0, 0, 0, 42]);

        let the_schema = Schema::parse_str(VIDEO_SUMMARY_SCHEMA)?;
        let (the_id, the_decoded) = decode_framed(&the_payload, &the_schema);
        assert_eq!(the_id, 42);
        assert_eq!(
            the_decoded,
            Value::Record(vec![
                ("TITLE".to_string(), Value::String("Rust in 100 Seconds".to_string())),
                ("VIEWS".to_string(), Value::Long(1_000_000)),
                ("LIKES".to_string(), Value::Int(42)),
                ("COMMENTS".to_string(), Value::Int(7)),
            ])
        );
        Ok(())
    }

    #[test]
    fn the_one_where_no_registry_means_plain_json() -> Result<()> {
        let the_payload = ValueEncoder::Json.encode(&the_value())?;
        let the_json: serde_json::Value = serde_json::from_slice(&the_payload)?;
        assert_eq!(the_json["TITLE"], "Rust in 100 Seconds");
        assert_eq!(the_json["VIEWS"], 1_000_000);
        Ok(())
    }

    #[test]
    fn the_one_where_the_schema_forgot_a_field_we_send() -> Result<()> {
        let the_stingy_schema = r#"{
            "type": "record",
            "name": "youtube_videos_value",
            "fields": [{ "name": "TITLE", "type": "string" }, { "name": "SHARES", "type": "long" }]
        }"#;
        let the_encoder = ValueEncoder::for_registered_schema(&registered(3, the_stingy_schema))?;
        assert!(the_encoder.encode(&the_value()).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_a_protobuf_subject_is_turned_away() {
        let mut the_registered = registered(9, "syntax = \"proto3\";");
        the_registered.schema_type = Some("PROTOBUF".to_string());
        let the_error = ValueEncoder::for_registered_schema(&the_registered)
            .expect_err("💀 only Avro subjects can configure the encoder");
        assert!(matches!(the_error.downcast_ref::<WatchError>(), Some(WatchError::Config(_))));
    }

    #[test]
    fn the_one_where_the_schema_is_not_even_json() {
        let the_error = ValueEncoder::for_registered_schema(&registered(9, "{ nope"))
            .expect_err("💀 an unparseable schema must not become an encoder");
        assert!(matches!(the_error.downcast_ref::<WatchError>(), Some(WatchError::Config(_))));
    }
}
