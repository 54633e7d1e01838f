/// Soundcore frame checksum: 8-bit wrapping sum of every byte before it.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
