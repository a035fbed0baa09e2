//! Serde adapters for `geo` types in the `[lon, lat]` array form the feeds use.
//!
//! Use with `#[serde(with = "crate::lonlat::line")]` and friends.

use geo::{Coord, LineString, Point};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn pairs(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.coords().map(|c| [c.x, c.y]).collect()
}

fn from_pairs(pairs: Vec<[f64; 2]>) -> LineString<f64> {
    pairs.into_iter().map(|[x, y]| Coord { x, y }).collect()
}

pub(crate) mod line {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(line: &LineString<f64>, s: S) -> Result<S::Ok, S::Error> {
        pairs(line).serialize(s)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<LineString<f64>, D::Error> {
        Vec::<[f64; 2]>::deserialize(d).map(from_pairs)
    }
}

pub(crate) mod opt_line {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(line: &Option<LineString<f64>>, s: S) -> Result<S::Ok, S::Error> {
        line.as_ref().map(pairs).serialize(s)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<LineString<f64>>, D::Error> {
        Option::<Vec<[f64; 2]>>::deserialize(d).map(|v| v.map(from_pairs))
    }
}

pub(crate) mod opt_point {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(point: &Option<Point<f64>>, s: S) -> Result<S::Ok, S::Error> {
        point.as_ref().map(|p| [p.x(), p.y()]).serialize(s)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Point<f64>>, D::Error> {
        Option::<[f64; 2]>::deserialize(d).map(|v| v.map(|[x, y]| Point::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Cnn, StreetSegment};
    use geo::LineString;

    #[test]
    fn lines_use_lon_lat_pairs() {
        let segment: StreetSegment = serde_json::from_str(
            r#"{ "cnn": 7, "line": [[-122.41, 37.76], [-122.40, 37.76]], "street": "MISSION ST" }"#,
        )
        .unwrap();
        assert_eq!(segment.cnn, Cnn(7));
        assert_eq!(segment.line, LineString::from(vec![(-122.41, 37.76), (-122.40, 37.76)]));

        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["line"], serde_json::json!([[-122.41, 37.76], [-122.40, 37.76]]));
    }
}
