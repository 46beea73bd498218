use rand::RngCore;

/// Hex encoding of `len` bytes from the thread-local CSPRNG.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
