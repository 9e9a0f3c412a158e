//! Action / Observation ID 生成
//!
//! ID 由版本前缀 `zzzz` 加上 16 字节载荷的 base32hex 编码组成：
//!
//! | 字节 | 内容 |
//! |---|---|
//! | 0..8  | `END_OF_TIME - unix 秒`（大端） |
//! | 8..12 | `999_999_999 - 纳秒`（大端） |
//! | 12..16 | 随机消歧值 |
//!
//! 时间取反，所以字典序越小的 ID 越新，按 ID 升序扫描即为按时间倒序。

use chrono::{DateTime, Utc};

use crate::error::{KarteError, KarteResult};

/// ID 版本前缀
pub const ID_VERSION: &str = "zzzz";

/// 9999-12-31T23:59:59Z
pub const END_OF_TIME_SECONDS: i64 = 253_402_300_799;

const MAX_NANOS: u32 = 999_999_999;

const BASE32HEX: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// 生成一个新 ID
pub fn new_id(t: DateTime<Utc>) -> KarteResult<String> {
    make_raw_id(t, rand::random())
}

/// 用指定的消歧值生成 ID
pub fn make_raw_id(t: DateTime<Utc>, disambiguator: u32) -> KarteResult<String> {
    let seconds = t.timestamp();
    if !(0..=END_OF_TIME_SECONDS).contains(&seconds) {
        return Err(KarteError::invalid(format!(
            "time {t} is outside the range supported by ids"
        )));
    }
    let coarse = (END_OF_TIME_SECONDS - seconds) as u64;
    // 闰秒时纳秒可能超过 10^9
    let fine = MAX_NANOS - t.timestamp_subsec_nanos().min(MAX_NANOS);

    let mut payload = [0u8; 16];
    payload[..8].copy_from_slice(&coarse.to_be_bytes());
    payload[8..12].copy_from_slice(&fine.to_be_bytes());
    payload[12..].copy_from_slice(&disambiguator.to_be_bytes());

    Ok(format!("{ID_VERSION}{}", encode_base32hex(&payload)))
}

/// 从 ID 中还原时间（精确到纳秒）
pub fn id_time(id: &str) -> Option<DateTime<Utc>> {
    let body = id.strip_prefix(ID_VERSION)?;
    let payload = decode_base32hex(body)?;
    if payload.len() < 12 {
        return None;
    }
    let coarse = u64::from_be_bytes(payload[..8].try_into().ok()?);
    let fine = u32::from_be_bytes(payload[8..12].try_into().ok()?);
    let seconds = END_OF_TIME_SECONDS.checked_sub(i64::try_from(coarse).ok()?)?;
    DateTime::from_timestamp(seconds, MAX_NANOS.checked_sub(fine)?)
}

/// 无填充的小写 base32hex 编码；定长输入时保持字节序
fn encode_base32hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &b in bytes {
        buffer = (buffer << 8) | u32::from(b);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32HEX[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32HEX[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn decode_base32hex(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in text.bytes() {
        let value = BASE32HEX.iter().position(|&x| x == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}
