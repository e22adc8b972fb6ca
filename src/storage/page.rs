//! Page codec for typed sub-columns.
//!
//! Page body layout, before compression:
//!
//! ```text
//! [u8 encoding][u8 type][u32 num_rows][presence bitmap][payload]
//! ```
//!
//! The (optionally LZ4 compressed) body is followed by a CRC32 of the bytes
//! as stored.

use crate::column::ColumnData;
use crate::config::Compression;
use crate::error::{FlatJsonError, Result};
use crate::types::LogicalType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

const DICT_MAX_ENTRIES: usize = 1 << 16;

/// How the values of a page are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Plain,
    Dictionary,
    BitPacked,
}

impl Encoding {
    fn tag(self) -> u8 {
        match self {
            Encoding::Plain => 0,
            Encoding::Dictionary => 1,
            Encoding::BitPacked => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Encoding::Plain),
            1 => Ok(Encoding::Dictionary),
            2 => Ok(Encoding::BitPacked),
            other => Err(FlatJsonError::corruption(format!("unknown page encoding {}", other))),
        }
    }
}

fn type_tag(ty: LogicalType) -> u8 {
    match ty {
        LogicalType::Boolean => 0,
        LogicalType::BigInt => 1,
        LogicalType::Double => 2,
        LogicalType::Varchar => 3,
        LogicalType::Json => 4,
    }
}

/// Pick an encoding from the value distribution of a sub-column.
///
/// Booleans and integers are bit packed. Strings and JSON use a dictionary
/// when at most half of the values are distinct.
pub fn speculate_encoding(data: &ColumnData) -> Encoding {
    match data {
        ColumnData::Boolean(_) | ColumnData::BigInt(_) => Encoding::BitPacked,
        ColumnData::Double(_) => Encoding::Plain,
        ColumnData::Varchar(values) => dictionary_or_plain(values.iter().flatten().map(String::as_str)),
        ColumnData::Json(values) => {
            let texts: Vec<String> = values.iter().flatten().map(Value::to_string).collect();
            dictionary_or_plain(texts.iter().map(String::as_str))
        }
    }
}

fn dictionary_or_plain<'a>(values: impl Iterator<Item = &'a str>) -> Encoding {
    let mut distinct = std::collections::HashSet::new();
    let mut count = 0usize;
    for v in values {
        count += 1;
        distinct.insert(v);
    }
    if count > 0 && distinct.len() <= DICT_MAX_ENTRIES && distinct.len() * 2 <= count {
        Encoding::Dictionary
    } else {
        Encoding::Plain
    }
}

/// Encode and frame one page
pub fn encode_page(data: &ColumnData, encoding: Encoding, compression: Compression) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.push(encoding.tag());
    body.push(type_tag(data.logical_type()));
    let num_rows = u32::try_from(data.len())
        .map_err(|_| FlatJsonError::invalid_argument("page has too many rows"))?;
    body.extend_from_slice(&num_rows.to_le_bytes());
    write_presence(data, &mut body);

    match (encoding, data) {
        (Encoding::Plain, ColumnData::Boolean(v)) => {
            body.extend(v.iter().flatten().map(|&b| u8::from(b)));
        }
        (Encoding::Plain, ColumnData::BigInt(v)) => {
            for n in v.iter().flatten() {
                body.extend_from_slice(&n.to_le_bytes());
            }
        }
        (Encoding::Plain, ColumnData::Double(v)) => {
            for d in v.iter().flatten() {
                body.extend_from_slice(&d.to_bits().to_le_bytes());
            }
        }
        (Encoding::Plain, ColumnData::Varchar(v)) => {
            for s in v.iter().flatten() {
                write_bytes(s.as_bytes(), &mut body)?;
            }
        }
        (Encoding::Plain, ColumnData::Json(v)) => {
            for j in v.iter().flatten() {
                write_bytes(j.to_string().as_bytes(), &mut body)?;
            }
        }
        (Encoding::BitPacked, ColumnData::Boolean(v)) => {
            let bits: Vec<u64> = v.iter().flatten().map(|&b| u64::from(b)).collect();
            pack_bits(&bits, 1, &mut body);
        }
        (Encoding::BitPacked, ColumnData::BigInt(v)) => {
            let present: Vec<i64> = v.iter().flatten().copied().collect();
            let min = present.iter().copied().min().unwrap_or(0);
            let max = present.iter().copied().max().unwrap_or(0);
            let width = 64 - ((max as i128 - min as i128) as u64).leading_zeros();
            body.extend_from_slice(&min.to_le_bytes());
            body.push(width as u8);
            let deltas: Vec<u64> = present
                .iter()
                .map(|&n| (n as i128 - min as i128) as u64)
                .collect();
            pack_bits(&deltas, width, &mut body);
        }
        (Encoding::Dictionary, ColumnData::Varchar(v)) => {
            write_dictionary(v.iter().flatten().map(|s| s.as_bytes().to_vec()), &mut body)?;
        }
        (Encoding::Dictionary, ColumnData::Json(v)) => {
            write_dictionary(v.iter().flatten().map(|j| j.to_string().into_bytes()), &mut body)?;
        }
        (encoding, data) => {
            return Err(FlatJsonError::invalid_argument(format!(
                "{:?} encoding does not support {}",
                encoding,
                data.logical_type()
            )));
        }
    }

    let mut page = match compression {
        Compression::Lz4 => lz4_flex::compress_prepend_size(&body),
        Compression::None => body,
    };
    let crc = crc32fast::hash(&page);
    page.extend_from_slice(&crc.to_le_bytes());
    Ok(page)
}

/// Verify, decompress and decode one page
pub fn decode_page(bytes: &[u8], expected: LogicalType, compression: Compression) -> Result<ColumnData> {
    if bytes.len() < 4 {
        return Err(FlatJsonError::corruption("page too short"));
    }
    let (stored, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if crc32fast::hash(stored) != crc {
        return Err(FlatJsonError::corruption("page checksum mismatch"));
    }

    let body = match compression {
        Compression::Lz4 => lz4_flex::decompress_size_prepended(stored)
            .map_err(|e| FlatJsonError::corruption(format!("page decompression failed: {}", e)))?,
        Compression::None => stored.to_vec(),
    };

    let mut cur = ByteCursor::new(&body);
    let encoding = Encoding::from_tag(cur.read_u8()?)?;
    let ty = cur.read_u8()?;
    if ty != type_tag(expected) {
        return Err(FlatJsonError::corruption(format!(
            "page type tag {} does not match {}",
            ty, expected
        )));
    }
    let num_rows = cur.read_u32()? as usize;
    let presence = read_presence(&mut cur, num_rows)?;
    let present = presence.iter().filter(|&&p| p).count();

    let data = match (encoding, expected) {
        (Encoding::Plain, LogicalType::Boolean) => {
            let values = (0..present)
                .map(|_| cur.read_u8().map(|b| b != 0))
                .collect::<Result<Vec<_>>>()?;
            ColumnData::Boolean(spread(&presence, values))
        }
        (Encoding::Plain, LogicalType::BigInt) => {
            let values = (0..present)
                .map(|_| cur.read_u64().map(|n| n as i64))
                .collect::<Result<Vec<_>>>()?;
            ColumnData::BigInt(spread(&presence, values))
        }
        (Encoding::Plain, LogicalType::Double) => {
            let values = (0..present)
                .map(|_| cur.read_u64().map(f64::from_bits))
                .collect::<Result<Vec<_>>>()?;
            ColumnData::Double(spread(&presence, values))
        }
        (Encoding::Plain, LogicalType::Varchar) => {
            let values = (0..present)
                .map(|_| cur.read_string())
                .collect::<Result<Vec<_>>>()?;
            ColumnData::Varchar(spread(&presence, values))
        }
        (Encoding::Plain, LogicalType::Json) => {
            let values = (0..present)
                .map(|_| cur.read_json())
                .collect::<Result<Vec<_>>>()?;
            ColumnData::Json(spread(&presence, values))
        }
        (Encoding::BitPacked, LogicalType::Boolean) => {
            let bits = unpack_bits(&mut cur, present, 1)?;
            ColumnData::Boolean(spread(&presence, bits.into_iter().map(|b| b != 0).collect()))
        }
        (Encoding::BitPacked, LogicalType::BigInt) => {
            let min = cur.read_u64()? as i64;
            let width = u32::from(cur.read_u8()?);
            if width > 64 {
                return Err(FlatJsonError::corruption(format!("bit width {} out of range", width)));
            }
            let values = unpack_bits(&mut cur, present, width)?
                .into_iter()
                .map(|d| (min as i128 + d as i128) as i64)
                .collect();
            ColumnData::BigInt(spread(&presence, values))
        }
        (Encoding::Dictionary, LogicalType::Varchar) => {
            let dict = read_dictionary(&mut cur, |c| c.read_string())?;
            let values = read_codes(&mut cur, present, &dict)?;
            ColumnData::Varchar(spread(&presence, values))
        }
        (Encoding::Dictionary, LogicalType::Json) => {
            let dict = read_dictionary(&mut cur, |c| c.read_json())?;
            let values = read_codes(&mut cur, present, &dict)?;
            ColumnData::Json(spread(&presence, values))
        }
        (encoding, ty) => {
            return Err(FlatJsonError::corruption(format!(
                "{:?} encoding cannot hold {}",
                encoding, ty
            )));
        }
    };

    if !cur.is_exhausted() {
        return Err(FlatJsonError::corruption("trailing bytes in page"));
    }
    Ok(data)
}

fn write_presence(data: &ColumnData, out: &mut Vec<u8>) {
    let len = data.len();
    let mut bitmap = vec![0u8; (len + 7) / 8];
    for i in 0..len {
        if !data.is_null(i) {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    out.extend_from_slice(&bitmap);
}

fn read_presence(cur: &mut ByteCursor<'_>, num_rows: usize) -> Result<Vec<bool>> {
    let bitmap = cur.read_bytes((num_rows + 7) / 8)?;
    Ok((0..num_rows)
        .map(|i| bitmap[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

/// Re-insert NULLs for absent rows
fn spread<T>(presence: &[bool], values: Vec<T>) -> Vec<Option<T>> {
    let mut values = values.into_iter();
    presence
        .iter()
        .map(|&p| if p { values.next() } else { None })
        .collect()
}

fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| FlatJsonError::invalid_argument("value larger than 4GiB"))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_dictionary(values: impl Iterator<Item = Vec<u8>>, out: &mut Vec<u8>) -> Result<()> {
    let mut dict: Vec<Vec<u8>> = Vec::new();
    let mut lookup: HashMap<Vec<u8>, u32> = HashMap::new();
    let mut codes = Vec::new();
    for value in values {
        let code = match lookup.get(&value) {
            Some(&code) => code,
            None => {
                let code = dict.len() as u32;
                lookup.insert(value.clone(), code);
                dict.push(value);
                code
            }
        };
        codes.push(code);
    }
    out.extend_from_slice(&(dict.len() as u32).to_le_bytes());
    for entry in &dict {
        write_bytes(entry, out)?;
    }
    for code in codes {
        out.extend_from_slice(&code.to_le_bytes());
    }
    Ok(())
}

fn read_dictionary<'a, T>(
    cur: &mut ByteCursor<'a>,
    mut read: impl FnMut(&mut ByteCursor<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    let len = cur.read_u32()? as usize;
    (0..len).map(|_| read(cur)).collect()
}

fn read_codes<T: Clone>(cur: &mut ByteCursor<'_>, count: usize, dict: &[T]) -> Result<Vec<T>> {
    (0..count)
        .map(|_| {
            let code = cur.read_u32()? as usize;
            dict.get(code)
                .cloned()
                .ok_or_else(|| FlatJsonError::corruption(format!("dictionary code {} out of range", code)))
        })
        .collect()
}

/// LSB-first bit packing of `width`-bit values
fn pack_bits(values: &[u64], width: u32, out: &mut Vec<u8>) {
    let mask: u128 = (1u128 << width) - 1;
    let mut acc: u128 = 0;
    let mut bits = 0u32;
    for &v in values {
        acc |= (u128::from(v) & mask) << bits;
        bits += width;
        while bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push(acc as u8);
    }
}

fn unpack_bits(cur: &mut ByteCursor<'_>, count: usize, width: u32) -> Result<Vec<u64>> {
    let nbytes = (count * width as usize + 7) / 8;
    let mut bytes = cur.read_bytes(nbytes)?.iter();
    let mask: u128 = (1u128 << width) - 1;
    let mut acc: u128 = 0;
    let mut bits = 0u32;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        while bits < width {
            let byte = bytes
                .next()
                .ok_or_else(|| FlatJsonError::corruption("bit packed run truncated"))?;
            acc |= u128::from(*byte) << bits;
            bits += 8;
        }
        out.push((acc & mask) as u64);
        acc >>= width;
        bits -= width;
    }
    Ok(out)
}

struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteCursor { buf, pos: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| FlatJsonError::corruption("page truncated"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FlatJsonError::corruption("invalid utf-8 in page"))
    }

    fn read_json(&mut self) -> Result<Value> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        serde_json::from_slice(bytes)
            .map_err(|e| FlatJsonError::corruption(format!("invalid json in page: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(data: ColumnData, compression: Compression) -> Encoding {
        let encoding = speculate_encoding(&data);
        let page = encode_page(&data, encoding, compression).unwrap();
        let decoded = decode_page(&page, data.logical_type(), compression).unwrap();
        assert_eq!(decoded, data);
        encoding
    }

    #[test]
    fn test_bigint_bit_packed() {
        let data = ColumnData::BigInt(vec![Some(21), None, Some(25), Some(-3), Some(i64::MAX)]);
        assert_eq!(check(data, Compression::Lz4), Encoding::BitPacked);
        check(ColumnData::BigInt(vec![Some(7), Some(7)]), Compression::None);
        check(ColumnData::BigInt(vec![None, None]), Compression::None);
    }

    #[test]
    fn test_strings_pick_dictionary() {
        let repeated = ColumnData::Varchar(vec![
            Some("commit".into()),
            Some("merge".into()),
            Some("commit".into()),
            None,
            Some("commit".into()),
            Some("merge".into()),
        ]);
        assert_eq!(check(repeated, Compression::Lz4), Encoding::Dictionary);

        let unique = ColumnData::Varchar(vec![Some("a".into()), Some("b".into())]);
        assert_eq!(check(unique, Compression::None), Encoding::Plain);
    }

    #[test]
    fn test_json_and_doubles() {
        let json = ColumnData::Json(vec![Some(json!({"c": 31})), Some(json!({})), None, Some(json!([1, 2]))]);
        assert_eq!(check(json, Compression::Lz4), Encoding::Plain);
        let doubles = ColumnData::Double(vec![Some(1.5), None, Some(-0.25)]);
        assert_eq!(check(doubles, Compression::Lz4), Encoding::Plain);
        let bools = ColumnData::Boolean(vec![Some(true), Some(false), None, Some(true)]);
        assert_eq!(check(bools, Compression::Lz4), Encoding::BitPacked);
    }

    #[test]
    fn test_checksum_mismatch() {
        let data = ColumnData::BigInt(vec![Some(1), Some(2)]);
        let mut page = encode_page(&data, Encoding::Plain, Compression::None).unwrap();
        page[3] ^= 0xff;
        let err = decode_page(&page, LogicalType::BigInt, Compression::None).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_type_mismatch() {
        let data = ColumnData::BigInt(vec![Some(1)]);
        let page = encode_page(&data, Encoding::Plain, Compression::Lz4).unwrap();
        assert!(decode_page(&page, LogicalType::Varchar, Compression::Lz4).is_err());
    }

    #[test]
    fn test_unsupported_encoding() {
        let data = ColumnData::Double(vec![Some(1.0)]);
        assert!(encode_page(&data, Encoding::Dictionary, Compression::None).is_err());
    }
}
