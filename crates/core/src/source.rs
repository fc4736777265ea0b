use serde::{Deserialize, Deserializer};

use crate::protocol::{Message, TallySlot, TallyState};

/// One addressable video source and its last transmitted tally snapshot.
///
/// Loaded from the `addresses` array of the configuration file. The
/// scheduler rewrites the four tally flags on every tick for this source,
/// always leaving exactly one of them set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TallySource {
    /// UMD display address. Values above 127 wrap on the wire.
    pub address: u16,
    /// Display name, truncated to 16 bytes when encoded. `null` reads as empty.
    #[serde(default, deserialize_with = "lenient_label")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub tally1: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub tally2: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub tally3: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub tally4: bool,
}

impl TallySource {
    pub fn new(address: u16, label: &str) -> Self {
        Self {
            address,
            label: label.to_string(),
            tally1: false,
            tally2: false,
            tally3: false,
            tally4: false,
        }
    }

    pub fn tally(&self) -> TallyState {
        TallyState {
            tally1: self.tally1,
            tally2: self.tally2,
            tally3: self.tally3,
            tally4: self.tally4,
        }
    }

    /// Clear all four lamps, then light `slot`.
    ///
    /// This is the only place the scheduler writes tally state.
    pub fn light(&mut self, slot: TallySlot) {
        let state = TallyState::only(slot);
        self.tally1 = state.tally1;
        self.tally2 = state.tally2;
        self.tally3 = state.tally3;
        self.tally4 = state.tally4;
    }

    /// Encode the current snapshot into a fresh wire message.
    pub fn encode(&self) -> Message {
        Message::encode(self.address, &self.label, self.tally())
    }
}

fn lenient_label<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `true`/`false` as well as the `0`/`1` numbers older config files use.
fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Float(f64),
        Null(()),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Float(n) => n != 0.0,
        Flag::Null(()) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_clears_other_lamps() {
        let mut source = TallySource::new(1, "CAM1");
        source.tally1 = true;
        source.tally3 = true;
        source.light(TallySlot::Tally4);
        assert_eq!(source.tally(), TallyState::only(TallySlot::Tally4));
        assert_eq!(source.tally().lit(), 1);
    }

    #[test]
    fn deserialize_minimal_entry() {
        let source: TallySource = serde_json::from_str(r#"{"address": 5}"#).unwrap();
        assert_eq!(source, TallySource::new(5, ""));
    }

    #[test]
    fn deserialize_numeric_flags() {
        let source: TallySource = serde_json::from_str(
            r#"{"address": 2, "label": "CAM2", "tally1": 1, "tally2": 0, "tally3": true, "tally4": null}"#,
        )
        .unwrap();
        assert!(source.tally1);
        assert!(!source.tally2);
        assert!(source.tally3);
        assert!(!source.tally4);
    }

    #[test]
    fn null_label_and_float_flags() {
        let source: TallySource = serde_json::from_str(
            r#"{"address": 3, "label": null, "tally1": 1.0, "tally2": 0.0}"#,
        )
        .unwrap();
        assert_eq!(source.label, "");
        assert!(source.tally1);
        assert!(!source.tally2);
    }

    #[test]
    fn entry_without_address_is_rejected() {
        assert!(serde_json::from_str::<TallySource>(r#"{"label": "CAM1"}"#).is_err());
        assert!(serde_json::from_str::<TallySource>(r#"{"address": -1}"#).is_err());
    }

    #[test]
    fn encode_uses_current_snapshot() {
        let mut source = TallySource::new(2, "CAM2");
        source.light(TallySlot::Program);
        let msg = source.encode();
        assert_eq!(msg.as_bytes()[0], 0x82);
        assert_eq!(msg.as_bytes()[1], 0x32);
        assert_eq!(msg.label_bytes(), b"CAM2");
    }
}
