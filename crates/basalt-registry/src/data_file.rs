use serde::Deserialize;
use std::collections::BTreeMap;

/// On-disk shape of a protocol data file. The embedded default covers the
/// content the library itself needs; embedders can load a fuller file.
#[derive(Debug, Deserialize)]
pub(crate) struct DataFile {
    /// Static identifier↔network-id maps, frozen on load.
    #[serde(default)]
    pub maps: BTreeMap<String, BTreeMap<String, i32>>,
    /// The block-state table.
    #[serde(default)]
    pub block_states: Vec<BlockStateRow>,
    /// Data-pack category listings; every listed entry starts as the
    /// "default" sentinel (no payload sent, client uses its known pack).
    #[serde(default)]
    pub data: BTreeMap<String, Vec<String>>,
    /// Tag tables; values may reference other tags with a `#` prefix.
    #[serde(default)]
    pub tags: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockStateRow {
    pub id: i32,
    pub block: String,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl BlockStateRow {
    /// The state key: `name[k1=v1,k2=v2]` with keys sorted lexicographically
    /// (BTreeMap iteration order), or the bare name without properties.
    pub fn state_key(&self) -> String {
        if self.properties.is_empty() {
            self.block.clone()
        } else {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("{}[{}]", self.block, props.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key() {
        let row: BlockStateRow = serde_json::from_str(
            r#"{"id": 9, "block": "minecraft:grass_block", "default": true,
                "properties": {"snowy": "false"}}"#,
        )
        .unwrap();
        assert_eq!(row.state_key(), "minecraft:grass_block[snowy=false]");

        let bare: BlockStateRow =
            serde_json::from_str(r#"{"id": 0, "block": "minecraft:air"}"#).unwrap();
        assert_eq!(bare.state_key(), "minecraft:air");
    }

    #[test]
    fn test_embedded_file_parses() {
        let file: DataFile =
            serde_json::from_str(include_str!("../data/registries_772.json")).unwrap();
        assert!(file.maps.contains_key("minecraft:block"));
        assert!(!file.block_states.is_empty());
        assert!(file.data.contains_key("minecraft:dimension_type"));
    }
}
