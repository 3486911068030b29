use alloy::primitives::{Bytes, keccak256};

/// Current layout version of the identifier, encoded as its third byte.
const FORMAT_VERSION: u8 = 0x00;

/// Analytics fingerprint appended to user-operation call-data.
///
/// Wire layout (32 bytes): `5afe` marker (2) | format version (1) |
/// keccak(project) tail (20) | keccak(platform) tail (3) | keccak(tool) tail (3) |
/// keccak(tool_version) tail (3). The trailing 3 bytes therefore depend only on the
/// tool version, never on project or platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnchainIdentifier {
    project: String,
    platform: String,
    tool: String,
    tool_version: String,
}

impl OnchainIdentifier {
    pub fn new(
        project: impl Into<String>,
        platform: impl Into<String>,
        tool: impl Into<String>,
        tool_version: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            platform: platform.into(),
            tool: tool.into(),
            tool_version: tool_version.into(),
        }
    }

    /// Identifier for a project using this crate as the tool.
    pub fn for_project(project: impl Into<String>, platform: impl Into<String>) -> Self {
        Self::new(
            project,
            platform,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
    }

    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&[0x5a, 0xfe, FORMAT_VERSION]);
        out.extend_from_slice(&hash_tail(&self.project, 20));
        out.extend_from_slice(&hash_tail(&self.platform, 3));
        out.extend_from_slice(&hash_tail(&self.tool, 3));
        out.extend_from_slice(&hash_tail(&self.tool_version, 3));
        out.into()
    }

    /// Returns `call_data` with the identifier appended.
    pub fn append_to(&self, call_data: Bytes) -> Bytes {
        let mut out = call_data.to_vec();
        out.extend_from_slice(&self.encode());
        out.into()
    }
}

impl std::fmt::Display for OnchainIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.encode()))
    }
}

fn hash_tail(input: &str, len: usize) -> Vec<u8> {
    keccak256(input.as_bytes())[32 - len..].to_vec()
}
