use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A block position in the world (x, y, z integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Encode as a 64-bit long (protocol format).
    /// x: 26 bits, z: 26 bits, y: 12 bits
    pub fn encode(&self) -> u64 {
        ((self.x as u64 & 0x3FFFFFF) << 38)
            | ((self.z as u64 & 0x3FFFFFF) << 12)
            | (self.y as u64 & 0xFFF)
    }

    pub fn decode(val: u64) -> Self {
        let mut x = (val >> 38) as i32;
        let mut z = ((val >> 12) & 0x3FFFFFF) as i32;
        let mut y = (val & 0xFFF) as i32;
        if x >= 1 << 25 {
            x -= 1 << 26;
        }
        if z >= 1 << 25 {
            z -= 1 << 26;
        }
        if y >= 1 << 11 {
            y -= 1 << 12;
        }
        Self { x, y, z }
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }

    /// Offset one block along a packet face value.
    /// Face: 0=bottom(y-1), 1=top(y+1), 2=north(z-1), 3=south(z+1), 4=west(x-1), 5=east(x+1)
    pub fn relative(&self, face: u8) -> BlockPos {
        match face {
            0 => BlockPos::new(self.x, self.y - 1, self.z),
            1 => BlockPos::new(self.x, self.y + 1, self.z),
            2 => BlockPos::new(self.x, self.y, self.z - 1),
            3 => BlockPos::new(self.x, self.y, self.z + 1),
            4 => BlockPos::new(self.x - 1, self.y, self.z),
            5 => BlockPos::new(self.x + 1, self.y, self.z),
            _ => *self,
        }
    }
}

/// A chunk position (x, z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chebyshev distance in chunks, used for view-distance checks.
    pub fn distance(&self, other: &ChunkPos) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }
}

/// A 3D position with double precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3d {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn block_pos(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos {
            x: (self.x.floor() as i32) >> 4,
            z: (self.z.floor() as i32) >> 4,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid identifier: {0:?}")]
pub struct IdentifierError(pub String);

/// A Minecraft resource identifier (e.g., "minecraft:stone").
/// Both parts are restricted to `[a-z0-9_/.]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub namespace: String,
    pub path: String,
}

impl Identifier {
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into(),
        }
    }

    pub fn minecraft(path: impl Into<String>) -> Self {
        Self::new("minecraft", path)
    }

    fn valid_part(s: &str) -> bool {
        !s.is_empty()
            && s.bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'/' | b'.'))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl std::str::FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ns, path) = match s.split_once(':') {
            Some((ns, path)) => (ns, path),
            None => ("minecraft", s),
        };
        if !Self::valid_part(ns) || !Self::valid_part(path) {
            return Err(IdentifierError(s.to_string()));
        }
        Ok(Self::new(ns, path))
    }
}

/// A player's game profile (UUID + name + properties).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameProfile {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
}

impl GameProfile {
    /// A profile with no properties, as created by offline-mode login.
    pub fn offline(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn textures(&self) -> Option<&ProfileProperty> {
        self.properties.iter().find(|p| p.name == "textures")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

/// Text component for chat and disconnect messages (simplified JSON text).
/// Either a literal `text` or a `translate` key; the receiver resolves the latter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextComponent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extra: Vec<TextComponent>,
}

impl TextComponent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn translated(key: impl Into<String>) -> Self {
        Self {
            translate: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"text":""}"#.to_string())
    }
}

/// Game mode enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GameMode {
    Survival = 0,
    Creative = 1,
    Adventure = 2,
    Spectator = 3,
}

impl GameMode {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Hand enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Hand {
    Main = 0,
    Off = 1,
}

impl Hand {
    /// Normalize a wire value to a hand, treating anything nonzero as off-hand.
    pub fn from_wire(v: i32) -> Self {
        if v == 0 {
            Hand::Main
        } else {
            Hand::Off
        }
    }
}

/// An item stack in an inventory slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStack {
    /// Item registry ID.
    pub item_id: i32,
    /// Number of items in this stack (1-127).
    pub count: i8,
}

impl ItemStack {
    pub fn new(item_id: i32, count: i8) -> Self {
        Self { item_id, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_position_roundtrip() {
        let cases = [
            BlockPos::new(0, 0, 0),
            BlockPos::new(3, 64, 5),
            BlockPos::new(-1, -1, -1),
            BlockPos::new((1 << 25) - 1, (1 << 11) - 1, (1 << 25) - 1),
            BlockPos::new(-(1 << 25), -(1 << 11), -(1 << 25)),
        ];
        for pos in cases {
            assert_eq!(BlockPos::decode(pos.encode()), pos);
        }
    }

    #[test]
    fn test_relative_faces() {
        let p = BlockPos::new(3, 64, 5);
        assert_eq!(p.relative(0), BlockPos::new(3, 63, 5));
        assert_eq!(p.relative(1), BlockPos::new(3, 65, 5));
        assert_eq!(p.relative(5), BlockPos::new(4, 64, 5));
    }

    #[test]
    fn test_identifier_parse() {
        let id = Identifier::from_str("minecraft:stone").unwrap();
        assert_eq!(id, Identifier::minecraft("stone"));
        assert_eq!(Identifier::from_str("stone").unwrap(), Identifier::minecraft("stone"));
        assert!(Identifier::from_str("Bad:Name").is_err());
        assert!(Identifier::from_str("a:").is_err());
    }

    #[test]
    fn test_text_component_json() {
        assert_eq!(TextComponent::plain("hi").to_json(), r#"{"text":"hi"}"#);
        assert_eq!(
            TextComponent::translated("disconnect.timeout").to_json(),
            r#"{"translate":"disconnect.timeout"}"#
        );
    }

    #[test]
    fn test_negative_chunk_pos() {
        assert_eq!(Vec3d::new(-0.5, 64.0, -17.0).chunk_pos(), ChunkPos::new(-1, -2));
        assert_eq!(BlockPos::new(-1, 0, -16).chunk_pos(), ChunkPos::new(-1, -1));
    }
}
