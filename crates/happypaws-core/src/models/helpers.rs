//! Lenient deserializers for backend fields whose shape varies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de;

// Helper to deserialize an ISO timestamp or a bare date; anything else is None
pub(crate) fn deserialize_lenient_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct DateTimeVisitor;

    impl<'de> de::Visitor<'de> for DateTimeVisitor {
        type Value = Option<DateTime<Utc>>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an RFC 3339 timestamp or YYYY-MM-DD date")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(parse_datetime(v))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(DateTimeVisitor)
}

pub(crate) fn parse_datetime(v: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// Helper to deserialize string or number as Option<String>
pub(crate) fn deserialize_string_or_number<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            if v.is_empty() {
                Ok(None)
            } else {
                Ok(Some(v.to_string()))
            }
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

// Helper for references that arrive either as an id string or as a populated
// document with an `_id`
pub(crate) fn deserialize_ref_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct RefVisitor;

    impl<'de> de::Visitor<'de> for RefVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an id string or an object with _id")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            let mut id = None;
            while let Some(key) = map.next_key::<String>()? {
                if key == "_id" || (key == "id" && id.is_none()) {
                    id = map.next_value::<Option<String>>()?;
                } else {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
            Ok(id)
        }
    }

    deserializer.deserialize_any(RefVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "deserialize_lenient_datetime")]
        at: Option<DateTime<Utc>>,
        #[serde(default, deserialize_with = "deserialize_string_or_number")]
        age: Option<String>,
        #[serde(default, deserialize_with = "deserialize_ref_id")]
        owner: Option<String>,
    }

    #[test]
    fn test_lenient_datetime() {
        let p: Probe = serde_json::from_str(r#"{"at":"2024-05-01T10:00:00.000Z"}"#).unwrap();
        assert_eq!(p.at.unwrap().month(), 5);

        let p: Probe = serde_json::from_str(r#"{"at":"2024-05-01"}"#).unwrap();
        assert_eq!(p.at.unwrap().day(), 1);

        let p: Probe = serde_json::from_str(r#"{"at":"soon"}"#).unwrap();
        assert!(p.at.is_none());

        let p: Probe = serde_json::from_str(r#"{"at":null}"#).unwrap();
        assert!(p.at.is_none());
    }

    #[test]
    fn test_string_or_number() {
        let p: Probe = serde_json::from_str(r#"{"age":3}"#).unwrap();
        assert_eq!(p.age.as_deref(), Some("3"));
        let p: Probe = serde_json::from_str(r#"{"age":"3"}"#).unwrap();
        assert_eq!(p.age.as_deref(), Some("3"));
        let p: Probe = serde_json::from_str(r#"{"age":""}"#).unwrap();
        assert!(p.age.is_none());
    }

    #[test]
    fn test_ref_id_accepts_string_or_document() {
        let p: Probe = serde_json::from_str(r#"{"owner":"abc"}"#).unwrap();
        assert_eq!(p.owner.as_deref(), Some("abc"));

        let p: Probe =
            serde_json::from_str(r#"{"owner":{"_id":"u1","email":"a@x.com"}}"#).unwrap();
        assert_eq!(p.owner.as_deref(), Some("u1"));
    }
}
