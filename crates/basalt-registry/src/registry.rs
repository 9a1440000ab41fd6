use crate::data_file::DataFile;
use basalt_nbt::NbtValue;
use basalt_protocol_core::{write_string, write_varint};
use bytes::BytesMut;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry is frozen")]
    Frozen,
    #[error("registry is not finalized yet")]
    NotFinalized,
    #[error("circular tag reference in {0}: {1}")]
    CircularTag(String, String),
    #[error("tag in {category} references unknown tag {tag}")]
    UnknownTagReference { category: String, tag: String },
    #[error("no network id for {name} in {category}")]
    UnknownEntry { category: String, name: String },
    #[error("bad data file: {0}")]
    DataFile(#[from] serde_json::Error),
}

/// A data-pack entry: either the "default" sentinel (the client resolves the
/// value from its own known core pack) or a custom NBT payload.
#[derive(Debug, Clone)]
pub enum DataValue {
    Default,
    Custom(NbtValue),
}

#[derive(Debug, Default)]
struct IdMap {
    by_name: HashMap<String, i32>,
    by_id: HashMap<i32, String>,
}

impl IdMap {
    fn insert(&mut self, name: String, id: i32) {
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, name);
    }
}

/// Process-wide registry: identifier↔network-id maps, data-pack entries, tag
/// tables and the block-state table.
///
/// Lifecycle: load → populate (embedder additions) → [`Registry::finalize`] →
/// serve. After finalization every collection is immutable and the
/// configuration-phase packets are pre-encoded. Per-connection registry
/// overrides are not supported; the data freezes process-wide.
pub struct Registry {
    maps: HashMap<String, IdMap>,
    /// Data-pack categories in deterministic (sorted) order; entries in
    /// insertion order. Entry index becomes the network id at finalize.
    data: Vec<(String, Vec<(String, DataValue)>)>,
    tags: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    state_by_key: HashMap<String, i32>,
    state_by_id: HashMap<i32, String>,
    default_states: HashMap<String, i32>,
    frozen: bool,
    network_data: Vec<Vec<u8>>,
    network_tags: Vec<u8>,
}

impl Registry {
    /// Load the embedded protocol-772 data file.
    pub fn load_default() -> Result<Self, RegistryError> {
        Self::from_json(include_str!("../data/registries_772.json"))
    }

    /// Load a data file from JSON, e.g. a fuller dump supplied by the embedder.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: DataFile = serde_json::from_str(json)?;

        let mut maps: HashMap<String, IdMap> = HashMap::new();
        for (category, entries) in file.maps {
            let map = maps.entry(category).or_default();
            for (name, id) in entries {
                map.insert(name, id);
            }
        }

        let mut state_by_key = HashMap::new();
        let mut state_by_id = HashMap::new();
        let mut default_states = HashMap::new();
        for row in &file.block_states {
            let key = row.state_key();
            state_by_key.insert(key.clone(), row.id);
            state_by_id.insert(row.id, key);
            if row.default {
                default_states.insert(row.block.clone(), row.id);
            }
        }

        let mut data = Vec::new();
        for (category, names) in file.data {
            // Other code may hold map references before finalization fills them.
            maps.entry(category.clone()).or_default();
            let entries = names
                .into_iter()
                .map(|name| (name, DataValue::Default))
                .collect();
            data.push((category, entries));
        }

        Ok(Self {
            maps,
            data,
            tags: file.tags,
            state_by_key,
            state_by_id,
            default_states,
            frozen: false,
            network_data: Vec::new(),
            network_tags: Vec::new(),
        })
    }

    // === Embedding-phase mutators ===

    /// Add or replace a data-pack entry. New entries order after existing ones.
    pub fn add_data(
        &mut self,
        category: &str,
        name: &str,
        value: DataValue,
    ) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        let entries = match self.data.iter_mut().find(|(c, _)| c == category) {
            Some((_, entries)) => entries,
            None => {
                self.maps.entry(category.to_string()).or_default();
                self.data.push((category.to_string(), Vec::new()));
                &mut self.data.last_mut().unwrap().1
            }
        };
        match entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => entries.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Add or replace a tag. Values may reference other tags with `#`.
    pub fn set_tag(
        &mut self,
        category: &str,
        tag: &str,
        values: Vec<String>,
    ) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        self.tags
            .entry(category.to_string())
            .or_default()
            .insert(tag.to_string(), values);
        Ok(())
    }

    // === Finalization ===

    /// Assign network ids to data-pack entries, flatten tags and pre-encode
    /// the configuration-phase packets. Idempotent; the first call freezes
    /// every collection.
    pub fn finalize(&mut self) -> Result<(), RegistryError> {
        if self.frozen {
            return Ok(());
        }

        // Data entries get ids in listing order, filling the category map.
        for (category, entries) in &self.data {
            let map = self.maps.entry(category.clone()).or_default();
            for (index, (name, _)) in entries.iter().enumerate() {
                map.insert(name.clone(), index as i32);
            }
        }

        // One registry_data body per category, in category order.
        self.network_data = self
            .data
            .iter()
            .map(|(category, entries)| {
                let mut buf = BytesMut::new();
                write_string(&mut buf, category);
                write_varint(&mut buf, entries.len() as i32);
                for (name, value) in entries {
                    write_string(&mut buf, name);
                    match value {
                        DataValue::Default => buf.extend_from_slice(&[0]),
                        DataValue::Custom(nbt) => {
                            buf.extend_from_slice(&[1]);
                            nbt.write_root_network(&mut buf);
                        }
                    }
                }
                buf.to_vec()
            })
            .collect();

        // Flatten into a fresh table so a cycle leaves the original intact.
        let mut flattened: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for (category, tags) in &self.tags {
            let mut out_tags = BTreeMap::new();
            for tag in tags.keys() {
                let mut visited = HashSet::new();
                let mut values = Vec::new();
                Self::flatten_tag(category, tags, tag, &mut visited, &mut values)?;
                out_tags.insert(tag.clone(), values);
            }
            flattened.insert(category.clone(), out_tags);
        }
        self.tags = flattened;

        // A single update_tags body covering every category.
        let mut buf = BytesMut::new();
        write_varint(&mut buf, self.tags.len() as i32);
        for (category, tags) in &self.tags {
            write_string(&mut buf, category);
            write_varint(&mut buf, tags.len() as i32);
            for (tag, values) in tags {
                write_string(&mut buf, tag);
                write_varint(&mut buf, values.len() as i32);
                for value in values {
                    let id = self
                        .maps
                        .get(category)
                        .and_then(|m| m.by_name.get(value))
                        .ok_or_else(|| RegistryError::UnknownEntry {
                            category: category.clone(),
                            name: value.clone(),
                        })?;
                    write_varint(&mut buf, *id);
                }
            }
        }
        self.network_tags = buf.to_vec();

        self.frozen = true;
        Ok(())
    }

    fn flatten_tag(
        category: &str,
        tags: &BTreeMap<String, Vec<String>>,
        tag: &str,
        visited: &mut HashSet<String>,
        out: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        if !visited.insert(tag.to_string()) {
            return Err(RegistryError::CircularTag(
                category.to_string(),
                tag.to_string(),
            ));
        }
        let values = tags
            .get(tag)
            .ok_or_else(|| RegistryError::UnknownTagReference {
                category: category.to_string(),
                tag: tag.to_string(),
            })?;
        for value in values {
            match value.strip_prefix('#') {
                Some(reference) => {
                    Self::flatten_tag(category, tags, reference, visited, out)?;
                }
                None => out.push(value.clone()),
            }
        }
        Ok(())
    }

    // === Queries ===

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The pre-encoded registry_data packet bodies, in send order.
    pub fn network_data(&self) -> Result<&[Vec<u8>], RegistryError> {
        if !self.frozen {
            return Err(RegistryError::NotFinalized);
        }
        Ok(&self.network_data)
    }

    /// The pre-encoded update_tags packet body.
    pub fn network_tags(&self) -> Result<&[u8], RegistryError> {
        if !self.frozen {
            return Err(RegistryError::NotFinalized);
        }
        Ok(&self.network_tags)
    }

    pub fn id_of(&self, category: &str, name: &str) -> Option<i32> {
        self.maps.get(category)?.by_name.get(name).copied()
    }

    pub fn name_of(&self, category: &str, id: i32) -> Option<&str> {
        self.maps.get(category)?.by_id.get(&id).map(String::as_str)
    }

    /// Resolve a block state from a numeric id, a bare block identifier
    /// (yielding its default state), or a full state key.
    pub fn block_state_id(&self, query: &str) -> Option<i32> {
        if let Ok(id) = query.parse::<i32>() {
            return self.state_by_id.contains_key(&id).then_some(id);
        }
        if query.contains('[') {
            return self.state_by_key.get(query).copied();
        }
        self.default_states.get(query).copied()
    }

    pub fn default_state_id(&self, block: &str) -> Option<i32> {
        self.default_states.get(block).copied()
    }

    pub fn state_key_of(&self, id: i32) -> Option<&str> {
        self.state_by_id.get(&id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_protocol_core::{read_string, read_varint};

    fn registry() -> Registry {
        Registry::load_default().unwrap()
    }

    #[test]
    fn test_block_state_queries() {
        let reg = registry();
        assert_eq!(reg.block_state_id("minecraft:air"), Some(0));
        assert_eq!(reg.block_state_id("minecraft:grass_block"), Some(9));
        assert_eq!(reg.block_state_id("minecraft:grass_block[snowy=true]"), Some(8));
        assert_eq!(reg.block_state_id("79"), Some(79));
        assert_eq!(reg.block_state_id("123456"), None);
        assert_eq!(reg.block_state_id("minecraft:command_block"), None);
    }

    #[test]
    fn test_finalize_assigns_ids_in_order() {
        let mut reg = registry();
        reg.finalize().unwrap();
        assert_eq!(reg.id_of("minecraft:dimension_type", "minecraft:overworld"), Some(0));
        assert_eq!(reg.id_of("minecraft:dimension_type", "minecraft:the_end"), Some(3));
        assert_eq!(
            reg.name_of("minecraft:worldgen/biome", 0),
            Some("minecraft:plains")
        );
    }

    #[test]
    fn test_frozen_after_finalize() {
        let mut reg = registry();
        assert!(reg.network_data().is_err());
        assert!(reg.network_tags().is_err());
        reg.finalize().unwrap();
        assert!(matches!(
            reg.add_data("minecraft:chat_type", "custom:late", DataValue::Default),
            Err(RegistryError::Frozen)
        ));
        assert!(matches!(
            reg.set_tag("minecraft:block", "custom:late", vec![]),
            Err(RegistryError::Frozen)
        ));
        assert!(reg.network_data().is_ok());
        assert!(reg.network_tags().is_ok());
        // Idempotent.
        reg.finalize().unwrap();
    }

    #[test]
    fn test_embedder_additions_order_after_statics() {
        let mut reg = registry();
        reg.add_data("minecraft:chat_type", "lobby:announce", DataValue::Default)
            .unwrap();
        reg.finalize().unwrap();
        // Five core chat types, then the custom one.
        assert_eq!(reg.id_of("minecraft:chat_type", "lobby:announce"), Some(5));
    }

    #[test]
    fn test_registry_data_packet_shape() {
        let mut reg = registry();
        reg.add_data(
            "minecraft:chat_type",
            "lobby:announce",
            DataValue::Custom(basalt_nbt::nbt_compound! {
                "priority" => NbtValue::Int(1)
            }),
        )
        .unwrap();
        reg.finalize().unwrap();

        let body = reg
            .network_data()
            .unwrap()
            .iter()
            .find(|b| b.starts_with(&[19])) // varint strlen of "minecraft:chat_type"
            .cloned()
            .unwrap();
        let mut buf = BytesMut::from(&body[..]);
        assert_eq!(read_string(&mut buf, 256).unwrap(), "minecraft:chat_type");
        let count = read_varint(&mut buf).unwrap();
        assert_eq!(count, 6);
        // First entry is the default sentinel: no payload follows.
        assert_eq!(read_string(&mut buf, 256).unwrap(), "minecraft:chat");
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_tag_flattening_dag() {
        let mut reg = registry();
        reg.finalize().unwrap();
        let tags = &reg.tags["minecraft:block"];
        let shovel = &tags["minecraft:mineable/shovel"];
        // The #minecraft:dirt reference flattened into its four members.
        assert_eq!(shovel.len(), 6);
        assert!(shovel.contains(&"minecraft:podzol".to_string()));
        assert!(shovel.contains(&"minecraft:gravel".to_string()));
        assert!(!shovel.iter().any(|v| v.starts_with('#')));
        // A tag referencing two tags that share members keeps duplicates out
        // of neither; flattening is purely structural.
        let carver = &tags["minecraft:overworld_carver_replaceables"];
        assert_eq!(carver.len(), 4 + 4 + 3);
    }

    #[test]
    fn test_tag_cycle_detected() {
        let mut reg = registry();
        reg.set_tag("minecraft:block", "a:a", vec!["#a:b".into()]).unwrap();
        reg.set_tag("minecraft:block", "a:b", vec!["#a:a".into()]).unwrap();
        match reg.finalize() {
            Err(RegistryError::CircularTag(category, _)) => {
                assert_eq!(category, "minecraft:block");
            }
            other => panic!("expected CircularTag, got {:?}", other.err()),
        }
        // The failed finalize left the registry mutable and the tag table intact.
        assert!(!reg.is_frozen());
        assert!(reg.tags["minecraft:block"]["minecraft:mineable/shovel"]
            .contains(&"#minecraft:dirt".to_string()));
    }

    #[test]
    fn test_update_tags_resolves_ids() {
        let mut reg = registry();
        reg.finalize().unwrap();
        let mut buf = BytesMut::from(reg.network_tags().unwrap());
        let categories = read_varint(&mut buf).unwrap();
        assert_eq!(categories, 3);
        let first = read_string(&mut buf, 256).unwrap();
        assert_eq!(first, "minecraft:block");
        let tag_count = read_varint(&mut buf).unwrap();
        assert_eq!(tag_count, 4);
        // Sorted order puts base_stone_overworld first: 4 entries.
        let tag = read_string(&mut buf, 256).unwrap();
        assert_eq!(tag, "minecraft:base_stone_overworld");
        let n = read_varint(&mut buf).unwrap();
        assert_eq!(n, 4);
        let stone = read_varint(&mut buf).unwrap();
        assert_eq!(stone, 1); // block id of minecraft:stone
    }
}
