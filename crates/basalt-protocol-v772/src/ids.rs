//! Packet id tables for protocol revision 772 (client 1.21.7/8).
//! Ids are per-phase and per-direction.

pub const PROTOCOL_VERSION: i32 = 772;
pub const VERSION_NAME: &str = "1.21.8";

// === Handshake, serverbound ===
pub mod handshake_sb {
    pub const INTENTION: i32 = 0x00;
}

// === Status ===
pub mod status_sb {
    pub const STATUS_REQUEST: i32 = 0x00;
    pub const PING_REQUEST: i32 = 0x01;
}

pub mod status_cb {
    pub const STATUS_RESPONSE: i32 = 0x00;
    pub const PONG_RESPONSE: i32 = 0x01;
}

// === Login ===
pub mod login_sb {
    pub const HELLO: i32 = 0x00;
    pub const KEY: i32 = 0x01;
    pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;
}

pub mod login_cb {
    pub const LOGIN_DISCONNECT: i32 = 0x00;
    pub const HELLO: i32 = 0x01;
    pub const LOGIN_FINISHED: i32 = 0x02;
}

// === Configuration ===
pub mod config_sb {
    pub const CLIENT_INFORMATION: i32 = 0x00;
    pub const CUSTOM_PAYLOAD: i32 = 0x02;
    pub const FINISH_CONFIGURATION: i32 = 0x03;
    pub const SELECT_KNOWN_PACKS: i32 = 0x07;
}

pub mod config_cb {
    pub const CUSTOM_PAYLOAD: i32 = 0x01;
    pub const DISCONNECT: i32 = 0x02;
    pub const FINISH_CONFIGURATION: i32 = 0x03;
    pub const REGISTRY_DATA: i32 = 0x07;
    pub const UPDATE_ENABLED_FEATURES: i32 = 0x0C;
    pub const UPDATE_TAGS: i32 = 0x0D;
    pub const SELECT_KNOWN_PACKS: i32 = 0x0E;
    pub const CUSTOM_REPORT_DETAILS: i32 = 0x0F;
    pub const SERVER_LINKS: i32 = 0x10;
}

// === Play, serverbound ===
pub mod play_sb {
    pub const ACCEPT_TELEPORTATION: i32 = 0x00;
    pub const CHAT_ACK: i32 = 0x05;
    pub const CHAT_COMMAND: i32 = 0x06;
    pub const CHAT: i32 = 0x08;
    pub const CHAT_SESSION_UPDATE: i32 = 0x09;
    pub const CHUNK_BATCH_RECEIVED: i32 = 0x0A;
    pub const CLIENT_TICK_END: i32 = 0x0C;
    pub const CLIENT_INFORMATION: i32 = 0x0D;
    pub const CUSTOM_PAYLOAD: i32 = 0x15;
    pub const KEEP_ALIVE: i32 = 0x1C;
    pub const MOVE_PLAYER_POS: i32 = 0x1E;
    pub const MOVE_PLAYER_POS_ROT: i32 = 0x1F;
    pub const MOVE_PLAYER_ROT: i32 = 0x20;
    pub const MOVE_PLAYER_STATUS_ONLY: i32 = 0x21;
    pub const PING_REQUEST: i32 = 0x26;
    pub const PLAYER_ABILITIES: i32 = 0x28;
    pub const PLAYER_ACTION: i32 = 0x29;
    pub const PLAYER_COMMAND: i32 = 0x2A;
    pub const PLAYER_INPUT: i32 = 0x2B;
    pub const PLAYER_LOADED: i32 = 0x2C;
    pub const SET_CARRIED_ITEM: i32 = 0x35;
    pub const SET_CREATIVE_MODE_SLOT: i32 = 0x38;
    pub const SWING: i32 = 0x3D;
    pub const USE_ITEM_ON: i32 = 0x40;
    pub const USE_ITEM: i32 = 0x41;
}

// === Play, clientbound ===
pub mod play_cb {
    pub const ADD_ENTITY: i32 = 0x01;
    pub const ANIMATE: i32 = 0x02;
    pub const BLOCK_CHANGED_ACK: i32 = 0x04;
    pub const BLOCK_UPDATE: i32 = 0x08;
    pub const CHUNK_BATCH_FINISHED: i32 = 0x0B;
    pub const CHUNK_BATCH_START: i32 = 0x0C;
    pub const CUSTOM_PAYLOAD: i32 = 0x18;
    pub const DISCONNECT: i32 = 0x1C;
    pub const DISGUISED_CHAT: i32 = 0x1D;
    pub const ENTITY_POSITION_SYNC: i32 = 0x1F;
    pub const FORGET_LEVEL_CHUNK: i32 = 0x21;
    pub const GAME_EVENT: i32 = 0x22;
    pub const KEEP_ALIVE: i32 = 0x26;
    pub const LEVEL_CHUNK_WITH_LIGHT: i32 = 0x27;
    pub const LOGIN: i32 = 0x2B;
    pub const PONG_RESPONSE: i32 = 0x37;
    pub const PLAYER_INFO_REMOVE: i32 = 0x3E;
    pub const PLAYER_INFO_UPDATE: i32 = 0x3F;
    pub const PLAYER_POSITION: i32 = 0x41;
    pub const REMOVE_ENTITIES: i32 = 0x46;
    pub const RESPAWN: i32 = 0x4B;
    pub const ROTATE_HEAD: i32 = 0x4C;
    pub const SET_CHUNK_CACHE_CENTER: i32 = 0x57;
    pub const SET_DEFAULT_SPAWN_POSITION: i32 = 0x5A;
    pub const SET_ENTITY_DATA: i32 = 0x5C;
    pub const SYSTEM_CHAT: i32 = 0x72;
}
