//! Typed, timestamped resource items
//!
//! An item is one typed value plus its descriptor and bookkeeping: who wrote
//! it last, when it was last set, and when it last actually changed. The two
//! timestamps carry the core invariant of the model: `last_changed` never
//! runs ahead of `last_set`, and a write of the current value bumps
//! `last_set` only.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, Result};

/// Value type of an item descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Double,
    String,
    Time,
    TimePattern,
}

impl ItemKind {
    /// Name used in error messages and the REST schema.
    pub fn name(self) -> &'static str {
        match self {
            ItemKind::Bool => "bool",
            ItemKind::U8 => "uint8",
            ItemKind::U16 => "uint16",
            ItemKind::U32 => "uint32",
            ItemKind::U64 => "uint64",
            ItemKind::I8 => "int8",
            ItemKind::I16 => "int16",
            ItemKind::I32 => "int32",
            ItemKind::I64 => "int64",
            ItemKind::Double => "double",
            ItemKind::String => "string",
            ItemKind::Time => "time",
            ItemKind::TimePattern => "timepattern",
        }
    }

    /// Inclusive bounds implied by the integer width, if any.
    fn width_bounds(self) -> Option<(i64, i64)> {
        match self {
            ItemKind::U8 => Some((0, u8::MAX as i64)),
            ItemKind::U16 => Some((0, u16::MAX as i64)),
            ItemKind::U32 => Some((0, u32::MAX as i64)),
            ItemKind::U64 => Some((0, i64::MAX)),
            ItemKind::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            ItemKind::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            ItemKind::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            ItemKind::I64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

/// A typed item value. Serializes untagged, so REST projections carry the
/// bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemValue {
    Bool(bool),
    Uint(u64),
    Int(i64),
    Double(f64),
    Str(String),
    Time(DateTime<Utc>),
}

impl ItemValue {
    /// Numeric view, if the value is numeric.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ItemValue::Uint(v) => i64::try_from(*v).ok(),
            ItemValue::Int(v) => Some(*v),
            ItemValue::Double(v) => Some(*v as i64),
            ItemValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ItemValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ItemValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Default value for a kind, used for implicit items.
    pub fn default_for(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Bool => ItemValue::Bool(false),
            ItemKind::U8 | ItemKind::U16 | ItemKind::U32 | ItemKind::U64 => ItemValue::Uint(0),
            ItemKind::I8 | ItemKind::I16 | ItemKind::I32 | ItemKind::I64 => ItemValue::Int(0),
            ItemKind::Double => ItemValue::Double(0.0),
            ItemKind::String | ItemKind::TimePattern => ItemValue::Str(String::new()),
            ItemKind::Time => ItemValue::Time(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

/// Who performed the last write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// REST / WebSocket client
    Api,
    /// Cluster handler decoding a radio frame
    Parse,
    /// Gateway-internal bookkeeping
    Internal,
}

/// Static metadata of an item.
#[derive(Debug, Clone, Copy)]
pub struct ItemDescriptor {
    /// Stable suffix path, e.g. `state/temperature`
    pub suffix: &'static str,
    /// Value type
    pub kind: ItemKind,
    /// Optional inclusive validity range for numeric kinds
    pub range: Option<(i64, i64)>,
    /// Exposed via REST
    pub public: bool,
    /// Value fixed at construction
    pub static_item: bool,
    /// Metadata-only; default value used
    pub implicit: bool,
    /// Emit an event on every accepted write, changed or not
    pub always_fire: bool,
    /// Writes stamp the owning sub-device's `state/lastupdated`
    pub state_bearing: bool,
}

/// Outcome of an accepted item write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueUpdate {
    /// The stored value changed; `last_changed` was stamped.
    Changed,
    /// The stored value was already equal; only `last_set` moved.
    Unchanged,
}

/// A single typed value with its descriptor and timestamps.
#[derive(Debug, Clone)]
pub struct Item {
    descriptor: &'static ItemDescriptor,
    value: ItemValue,
    last_set: Option<DateTime<Utc>>,
    last_changed: Option<DateTime<Utc>>,
    source: SourceTag,
}

impl Item {
    /// Construct an item with the kind's default value.
    pub fn new(descriptor: &'static ItemDescriptor) -> Self {
        Self {
            descriptor,
            value: ItemValue::default_for(descriptor.kind),
            last_set: None,
            last_changed: None,
            source: SourceTag::Internal,
        }
    }

    /// Construct an item with an initial value (used for static items).
    pub fn with_value(descriptor: &'static ItemDescriptor, value: ItemValue) -> Result<Self> {
        let coerced = coerce(descriptor, value)?;
        Ok(Self {
            descriptor,
            value: coerced,
            last_set: None,
            last_changed: None,
            source: SourceTag::Internal,
        })
    }

    pub fn descriptor(&self) -> &'static ItemDescriptor {
        self.descriptor
    }

    pub fn suffix(&self) -> &'static str {
        self.descriptor.suffix
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    pub fn last_set(&self) -> Option<DateTime<Utc>> {
        self.last_set
    }

    pub fn last_changed(&self) -> Option<DateTime<Utc>> {
        self.last_changed
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// Validate and store a value. On rejection nothing is touched; on
    /// acceptance `last_set` is stamped, and `last_changed` only when the
    /// value differs from the previous one.
    pub fn set_value(
        &mut self,
        value: ItemValue,
        source: SourceTag,
        now: DateTime<Utc>,
    ) -> Result<ValueUpdate> {
        if self.descriptor.static_item && self.last_set.is_some() {
            return Err(CoreError::StaticItem(self.descriptor.suffix.to_string()));
        }
        let coerced = coerce(self.descriptor, value)?;

        let changed = coerced != self.value;
        self.last_set = Some(now);
        self.source = source;
        if changed {
            self.value = coerced;
            self.last_changed = Some(now);
            Ok(ValueUpdate::Changed)
        } else {
            Ok(ValueUpdate::Unchanged)
        }
    }
}

/// Validate a value against a descriptor, coercing between compatible
/// numeric shapes. Rejections leave the caller's item untouched.
fn coerce(desc: &ItemDescriptor, value: ItemValue) -> Result<ItemValue> {
    let mismatch = || CoreError::TypeMismatch {
        suffix: desc.suffix.to_string(),
        expected: desc.kind.name(),
    };

    let coerced = match desc.kind {
        ItemKind::Bool => match value {
            ItemValue::Bool(_) => value,
            _ => return Err(mismatch()),
        },
        ItemKind::U8 | ItemKind::U16 | ItemKind::U32 | ItemKind::U64 => match value {
            ItemValue::Uint(_) => value,
            ItemValue::Int(v) if v >= 0 => ItemValue::Uint(v as u64),
            _ => return Err(mismatch()),
        },
        ItemKind::I8 | ItemKind::I16 | ItemKind::I32 | ItemKind::I64 => match value {
            ItemValue::Int(_) => value,
            ItemValue::Uint(v) => {
                ItemValue::Int(i64::try_from(v).map_err(|_| mismatch())?)
            }
            _ => return Err(mismatch()),
        },
        ItemKind::Double => match value {
            ItemValue::Double(_) => value,
            ItemValue::Uint(v) => ItemValue::Double(v as f64),
            ItemValue::Int(v) => ItemValue::Double(v as f64),
            _ => return Err(mismatch()),
        },
        ItemKind::String | ItemKind::TimePattern => match value {
            ItemValue::Str(_) => value,
            _ => return Err(mismatch()),
        },
        ItemKind::Time => match value {
            ItemValue::Time(_) => value,
            ItemValue::Str(ref s) => {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| mismatch())?;
                ItemValue::Time(parsed.with_timezone(&Utc))
            }
            _ => return Err(mismatch()),
        },
    };

    // Range check: explicit descriptor range first, then integer width.
    if let Some(n) = coerced.as_i64() {
        let bounds = desc.range.or_else(|| desc.kind.width_bounds());
        if let Some((min, max)) = bounds {
            if n < min || n > max {
                return Err(CoreError::OutOfRange {
                    suffix: desc.suffix.to_string(),
                    value: n,
                    min,
                    max,
                });
            }
        }
    }

    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEMP: ItemDescriptor = ItemDescriptor {
        suffix: "state/temperature",
        kind: ItemKind::I16,
        range: Some((-27315, 32767)),
        public: true,
        static_item: false,
        implicit: false,
        always_fire: false,
        state_bearing: true,
    };

    static BUTTON: ItemDescriptor = ItemDescriptor {
        suffix: "state/buttonevent",
        kind: ItemKind::U32,
        range: None,
        public: true,
        static_item: false,
        implicit: false,
        always_fire: true,
        state_bearing: true,
    };

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_change_stamps_both_timestamps() {
        let mut item = Item::new(&TEMP);
        let t = now();
        assert_eq!(item.set_value(ItemValue::Int(2150), SourceTag::Parse, t).unwrap(), ValueUpdate::Changed);
        assert_eq!(item.last_set(), Some(t));
        assert_eq!(item.last_changed(), Some(t));
        assert_eq!(item.source(), SourceTag::Parse);
    }

    #[test]
    fn test_same_value_bumps_last_set_only() {
        let mut item = Item::new(&TEMP);
        let t1 = now();
        item.set_value(ItemValue::Int(2150), SourceTag::Parse, t1).unwrap();
        let t2 = t1 + chrono::Duration::seconds(5);
        assert_eq!(
            item.set_value(ItemValue::Int(2150), SourceTag::Parse, t2).unwrap(),
            ValueUpdate::Unchanged
        );
        assert_eq!(item.last_set(), Some(t2));
        assert_eq!(item.last_changed(), Some(t1));
        assert!(item.last_changed() <= item.last_set());
    }

    #[test]
    fn test_rejected_write_touches_nothing() {
        let mut item = Item::new(&TEMP);
        let t = now();
        item.set_value(ItemValue::Int(2000), SourceTag::Parse, t).unwrap();
        let err = item
            .set_value(ItemValue::Int(40_000), SourceTag::Api, t + chrono::Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, CoreError::OutOfRange { .. }));
        assert_eq!(item.value(), &ItemValue::Int(2000));
        assert_eq!(item.last_set(), Some(t));
    }

    #[test]
    fn test_type_mismatch() {
        let mut item = Item::new(&TEMP);
        let err = item
            .set_value(ItemValue::Str("warm".into()), SourceTag::Api, now())
            .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn test_uint_coerces_into_signed() {
        let mut item = Item::new(&TEMP);
        item.set_value(ItemValue::Uint(100), SourceTag::Parse, now()).unwrap();
        assert_eq!(item.value(), &ItemValue::Int(100));
    }

    #[test]
    fn test_width_bounds_apply_without_descriptor_range() {
        static BRI: ItemDescriptor = ItemDescriptor {
            suffix: "state/bri",
            kind: ItemKind::U8,
            range: None,
            public: true,
            static_item: false,
            implicit: false,
            always_fire: false,
            state_bearing: true,
        };
        let mut item = Item::new(&BRI);
        assert!(item.set_value(ItemValue::Uint(300), SourceTag::Api, now()).is_err());
        assert!(item.set_value(ItemValue::Uint(200), SourceTag::Api, now()).is_ok());
    }

    #[test]
    fn test_always_fire_descriptor_flag() {
        assert!(BUTTON.always_fire);
        assert!(!TEMP.always_fire);
    }
}
