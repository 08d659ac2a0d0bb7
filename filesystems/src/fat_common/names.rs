// 8.3 name handling with the sampler's glyph substitutions
//
// The sampler's character set puts a few symbols in the upper half of the
// byte range. On the host they are shown as ASCII look-alikes. Every other
// byte maps to the Latin-1 code point of the same value. A raw name survives
// a decode/encode cycle unless it holds one of the ASCII look-alikes itself:
// those bytes come back as the glyph byte.

/// Raw on-disk byte and the host character it is displayed as
pub const GLYPH_SUBSTITUTIONS: [(u8, char); 4] = [
    (0x81, '!'), // drive symbol
    (0x84, '^'), // arrow up
    (0x94, '~'), // wave
    (0x99, '%'), // percent sign
];

pub const NAME_LEN: usize = 8;
pub const EXT_LEN: usize = 3;
pub const PADDING: u8 = 0x20;

pub fn decode_byte(byte: u8) -> char {
    GLYPH_SUBSTITUTIONS
        .iter()
        .find(|(raw, _)| *raw == byte)
        .map(|(_, c)| *c)
        .unwrap_or(byte as char)
}

/// Characters outside Latin-1 have no on-disk form and become `_`
pub fn encode_char(c: char) -> u8 {
    if let Some((raw, _)) = GLYPH_SUBSTITUTIONS.iter().find(|(_, ch)| *ch == c) {
        return *raw;
    }
    u32::from(c).try_into().unwrap_or(b'_')
}

pub fn decode_bytes(raw: &[u8]) -> String {
    raw.iter().copied().map(decode_byte).collect()
}

fn encode_padded(s: &str, len: usize) -> Vec<u8> {
    let mut out: Vec<u8> = s.chars().take(len).map(encode_char).collect();
    out.resize(len, PADDING);
    out
}

fn trim_padding(s: &str) -> &str {
    s.trim_end_matches(' ')
}

/// An extension is rendered as `name.ext` when it is plain text
fn is_known_extension(ext: &[u8]) -> bool {
    let ext = trim_padding_bytes(ext);
    !ext.is_empty() && ext.iter().all(|b| b.is_ascii_alphanumeric())
}

fn trim_padding_bytes(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|b| *b != PADDING)
        .map(|i| i + 1)
        .unwrap_or(0);
    &raw[..end]
}

/// Render a raw 11-byte name for the host
pub fn decode_name(raw: &[u8; 11], is_dir: bool) -> String {
    let (name, ext) = raw.split_at(NAME_LEN);
    let base = decode_bytes(trim_padding_bytes(name));

    if !is_dir && is_known_extension(ext) && !base.is_empty() && !base.contains('.') {
        return format!("{}.{}", base, decode_bytes(trim_padding_bytes(ext)));
    }
    if !is_dir && trim_padding_bytes(ext).is_empty() && !base.is_empty() {
        return base;
    }
    trim_padding(&decode_bytes(raw)).to_string()
}

/// Inverse of [`decode_name`]: split on a single `.` for files, then
/// truncate and pad to 8+3
pub fn encode_name(host: &str, is_dir: bool) -> [u8; 11] {
    let mut raw = [PADDING; 11];

    let split = if is_dir || host.starts_with('.') {
        None
    } else {
        match host.rsplit_once('.') {
            Some((name, ext)) if host.matches('.').count() == 1 && !ext.contains(' ') => {
                Some((name, ext))
            }
            _ => None,
        }
    };

    match split {
        Some((name, ext)) => {
            raw[..NAME_LEN].copy_from_slice(&encode_padded(name, NAME_LEN));
            raw[NAME_LEN..].copy_from_slice(&encode_padded(ext, EXT_LEN));
        }
        None => raw.copy_from_slice(&encode_padded(host, NAME_LEN + EXT_LEN)),
    }
    raw
}
