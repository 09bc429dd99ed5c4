// Content hashes for determinism checks.
//
// All digests are hex-encoded SHA-256. Events and text are hashed over their
// serde_json encoding, which is stable for a given value (struct fields in
// declaration order, floats printed shortest-round-trip). The normalized
// response hash blanks `artifacts.timestamp` first, so two responses for the
// same request compare equal regardless of when they were produced. The
// audio URL is derived from the seed and is part of the comparison.

use crate::request::ComposeResponse;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use starsong_explain::realize::TextOutput;
use starsong_music::event::{Piece, StructureMode};
use starsong_music::render::AudioBuffer;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn json_sha256<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&serde_json::to_vec(value)?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    pub audio: String,
    pub events: String,
    pub text: String,
}

impl ContentHashes {
    pub fn compute(
        audio: &AudioBuffer,
        piece: &Piece,
        text: &TextOutput,
    ) -> Result<Self, serde_json::Error> {
        Ok(ContentHashes {
            audio: audio.sha256_hex(),
            events: json_sha256(piece)?,
            text: json_sha256(text)?,
        })
    }
}

/// Seed-derived audio location: `/audio/<16 hex>.wav`.
pub fn audio_url(hash: &str, structure: StructureMode) -> String {
    let digest = sha256_hex(format!("{hash}:{}", structure.as_str()).as_bytes());
    format!("/audio/{}.wav", &digest[..16])
}

/// Hash of the response with `artifacts.timestamp` blanked.
pub fn normalized_response_hash(response: &ComposeResponse) -> Result<String, serde_json::Error> {
    let mut normalized = response.clone();
    normalized.artifacts.timestamp.clear();
    json_sha256(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_audio_url_depends_on_seed_and_structure() {
        let a = audio_url("seed-A", StructureMode::HouseOrder);
        assert!(a.starts_with("/audio/"));
        assert!(a.ends_with(".wav"));
        assert_eq!(a.len(), "/audio/".len() + 16 + ".wav".len());
        assert_eq!(a, audio_url("seed-A", StructureMode::HouseOrder));
        assert_ne!(a, audio_url("seed-B", StructureMode::HouseOrder));
        assert_ne!(a, audio_url("seed-A", StructureMode::Lunar));
    }
}
