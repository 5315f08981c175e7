use geo::{LineString, Point};
use serde::Deserialize;
use wkt::TryFromWkt;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub(super) fn deserialize_wkt_point<'de, D>(deserializer: D) -> Result<Option<Point<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match non_empty(Option::<String>::deserialize(deserializer)?) {
        None => Ok(None),
        Some(wkt_str) => Point::try_from_wkt_str(&wkt_str)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

pub(super) fn deserialize_wkt_linestring<'de, D>(
    deserializer: D,
) -> Result<Option<LineString<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match non_empty(Option::<String>::deserialize(deserializer)?) {
        None => Ok(None),
        Some(wkt_str) => LineString::try_from_wkt_str(&wkt_str)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// `highway` is either a plain tag or a serialized list such as
/// `['residential', 'footway']`
pub(super) fn deserialize_highway<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    Ok(parse_highway(&raw))
}

fn parse_highway(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|tag| tag.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}
