//! Hash-code generator (§6 "Collaborators consumed"): stable across
//! processes for the same input, used both to compute an event's `hashCode`
//! (§3) and to route requests in the shard router (§4.H).

use crc32fast::Hasher;

pub trait HashCodeGenerator: Send + Sync {
    fn hash_code(&self, input: &str) -> i32;
}

/// Default implementation: CRC-32 truncated/reinterpreted as a signed
/// 32-bit integer. Grounded on the teacher's use of `crc32fast` for
/// checksums elsewhere in the stack; CRC-32 is deterministic across
/// processes and platforms, which is the only contract §6 asks for.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32HashCodeGenerator;

impl HashCodeGenerator for Crc32HashCodeGenerator {
    fn hash_code(&self, input: &str) -> i32 {
        let mut hasher = Hasher::new();
        hasher.update(input.as_bytes());
        hasher.finalize() as i32
    }
}
