//! Concat KDF (NIST SP 800-56A §5.8.1) with SHA-256, as used by ECDH-ES.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

fn length_prefixed(hasher: &mut Sha256, data: &[u8]) {
    hasher.update((data.len() as u32).to_be_bytes());
    hasher.update(data);
}

/// Derive `key_data_len_bits` bits from the shared secret `z`.
///
/// OtherInfo is `AlgorithmID || PartyUInfo || PartyVInfo || SuppPubInfo`, the
/// first three length-prefixed, SuppPubInfo the output length in bits.
pub fn concat_kdf(
    z: &[u8],
    algorithm_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_data_len_bits: u32,
) -> Zeroizing<Vec<u8>> {
    let key_len = (key_data_len_bits as usize).div_ceil(8);
    let mut out = Zeroizing::new(Vec::with_capacity(key_len + 32));
    let mut round: u32 = 1;
    while out.len() < key_len {
        let mut hasher = Sha256::new();
        hasher.update(round.to_be_bytes());
        hasher.update(z);
        length_prefixed(&mut hasher, algorithm_id.as_bytes());
        length_prefixed(&mut hasher, apu);
        length_prefixed(&mut hasher, apv);
        hasher.update(key_data_len_bits.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        round += 1;
    }
    out.truncate(key_len);
    out
}
