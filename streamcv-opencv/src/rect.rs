//! Detection / overlay regions.

use crate::error::CvError;
use serde::{Deserialize, Serialize};
use streamcv_core::{Map, MapExt, Value};

/// Axis-aligned region, origin top-left. May extend past the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

fn coord(map: &Map, key: &str) -> Result<i32, CvError> {
    let value = map.to_int(key)?;
    i32::try_from(value).map_err(|_| CvError::TypeCoercion {
        field: key.to_string(),
        expected: "32-bit int",
        actual: value.to_string(),
    })
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_map(map: &Map) -> Result<Self, CvError> {
        Ok(Self {
            x: coord(map, "x")?,
            y: coord(map, "y")?,
            width: coord(map, "width")?,
            height: coord(map, "height")?,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, CvError> {
        let map = value.as_map().ok_or_else(|| CvError::TypeCoercion {
            field: "rects".to_string(),
            expected: "map",
            actual: value.type_name().to_string(),
        })?;
        Self::from_map(map)
    }

    pub fn from_values(values: &[Value]) -> Result<Vec<Self>, CvError> {
        values.iter().map(Self::from_value).collect()
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(4);
        map.insert("x".to_string(), Value::from(self.x));
        map.insert("y".to_string(), Value::from(self.y));
        map.insert("width".to_string(), Value::from(self.width));
        map.insert("height".to_string(), Value::from(self.height));
        Value::Map(map)
    }

    /// Intersection with a `width` x `height` frame, `None` when empty.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(width));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32))
    }
}
