use basalt_types::{GameProfile, ProfileProperty};
use num_bigint::BigInt;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{info, warn};
use uuid::Uuid;

/// Minecraft's variant of a SHA-1 hex digest: the 20 bytes are interpreted as
/// a signed big-endian two's-complement integer, printed in hex with leading
/// zeros stripped and a `-` prefix when negative.
pub(crate) fn server_id_digest(shared_secret: &[u8], public_key_der: &[u8]) -> String {
    let hash = Sha1::new()
        .chain_update(shared_secret)
        .chain_update(public_key_der)
        .finalize();
    BigInt::from_signed_bytes_be(&hash).to_str_radix(16)
}

#[derive(Debug, Deserialize)]
struct HasJoinedResponse {
    id: String,
    name: String,
    #[serde(default)]
    properties: Vec<HasJoinedProperty>,
}

#[derive(Debug, Deserialize)]
struct HasJoinedProperty {
    name: String,
    value: String,
    #[serde(default)]
    signature: Option<String>,
}

pub(crate) enum SessionVerdict {
    /// HTTP 200: the authoritative profile (casing, UUID, skin blob).
    Verified(GameProfile),
    /// HTTP 204: the client did not announce this join to Mojang.
    Rejected,
    /// Transport failure or unexpected status.
    Unavailable,
}

/// Ask the Mojang session server whether `username` announced a join with the
/// given server-id digest.
pub(crate) async fn has_joined(username: &str, server_id: &str) -> SessionVerdict {
    let url = format!(
        "https://sessionserver.mojang.com/session/minecraft/hasJoined?username={username}&serverId={server_id}"
    );
    let response = match reqwest::get(&url).await {
        Ok(response) => response,
        Err(e) => {
            warn!("session server unreachable: {e}");
            return SessionVerdict::Unavailable;
        }
    };

    match response.status().as_u16() {
        200 => {}
        204 => return SessionVerdict::Rejected,
        status => {
            warn!("session server returned {status}");
            return SessionVerdict::Unavailable;
        }
    }

    let body: HasJoinedResponse = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!("bad session server response: {e}");
            return SessionVerdict::Unavailable;
        }
    };

    let uuid = match Uuid::parse_str(&body.id) {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!("session server sent bad uuid {:?}: {e}", body.id);
            return SessionVerdict::Unavailable;
        }
    };

    info!("session server verified {} as {}", body.name, uuid);
    SessionVerdict::Verified(GameProfile {
        uuid,
        name: body.name,
        properties: body
            .properties
            .into_iter()
            .map(|p| ProfileProperty {
                name: p.name,
                value: p.value,
                signature: p.signature,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_vectors() {
        // Digests published for the vanilla protocol encryption scheme.
        let digest = |input: &[u8]| BigInt::from_signed_bytes_be(&Sha1::digest(input)).to_str_radix(16);
        assert_eq!(digest(b"Notch"), "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48");
        assert_eq!(digest(b"jeb_"), "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1");
        assert_eq!(digest(b"simon"), "88e16a1019277b15d58faf0541e11910eb756f6");
    }

    #[test]
    fn test_digest_concatenates_secret_and_key() {
        assert_eq!(
            server_id_digest(b"No", b"tch"),
            "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"
        );
    }

    #[test]
    fn test_hyphenless_uuid_parses() {
        let uuid = Uuid::parse_str("069a79f444e94726a5befca90e38aaf5").unwrap();
        assert_eq!(
            uuid.hyphenated().to_string(),
            "069a79f4-44e9-4726-a5be-fca90e38aaf5"
        );
    }
}
