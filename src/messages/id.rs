use uuid::Uuid;

const RANDOM_MASK: u32 = 0x7fff_ffff;

/// 32 random bits taken from the fully random tail of a v4 UUID.
pub fn random_u32() -> u32 {
    Uuid::new_v4().as_u128() as u32
}

/// Uniform-ish pick in `0..bound`. `bound` must be non-zero.
pub fn random_below(bound: usize) -> usize {
    (random_u32() as usize) % bound
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Client-side message identifier: a random value below 2^31 in base 36,
/// followed by another one xor-ed with the low 32 bits of the clock.
/// Collisions are possible and never checked.
pub fn random_id(now_ms: i64) -> String {
    let head = random_u32() & RANDOM_MASK;
    let tail = ((random_u32() & RANDOM_MASK) as i32) ^ (now_ms as i32);
    format!("{}{}", to_base36(head as u64), to_base36(tail.unsigned_abs() as u64))
}
