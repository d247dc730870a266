//! # メモリレイアウト
//!
//! 配列とレコードは値型として線形メモリ上の静的領域に置かれます。
//!
//! - `integer` / `boolean` は 4 バイト、`real` は 8 バイト
//! - レコードはフィールドを宣言順に、各フィールドの自然なアラインメントで並べる
//! - 配列は 4 バイトの長さヘッダの後に要素が続く。ヘッダはデータセグメントで初期化する

use crate::frontend::error::{CompilerError, Result};
use crate::frontend::semantic::{PrimitiveType, RecordType, TypeInfo};

use super::module::{DataSegment, ValueType};

/// 配列の長さヘッダのバイト数
pub const ARRAY_HEADER_SIZE: u32 = 4;

/// ページサイズ（64KiB）
pub const PAGE_SIZE: u32 = 65536;

/// 32ビットアドレス空間のページ数の上限
pub const MAX_PAGES: u32 = 65536;

/// この間隔以下のヘッダは同じデータセグメントにまとめる
const SEGMENT_GAP: u32 = 16;

/// 値をスタックに載せるときの型。集約型はアドレス（i32）になる。
pub fn value_type(ty: &TypeInfo) -> Option<ValueType> {
    match ty {
        TypeInfo::Primitive(PrimitiveType::Integer | PrimitiveType::Boolean) => Some(ValueType::I32),
        TypeInfo::Primitive(PrimitiveType::Real) => Some(ValueType::F64),
        TypeInfo::Array { .. } | TypeInfo::Record(_) => Some(ValueType::I32),
        TypeInfo::Primitive(PrimitiveType::Void) | TypeInfo::Error => None,
    }
}

pub fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

fn checked_align_up(value: u32, align: u32) -> Result<u32> {
    value.div_ceil(align).checked_mul(align).ok_or_else(too_large)
}

pub fn alignment(ty: &TypeInfo) -> u32 {
    match ty {
        TypeInfo::Primitive(PrimitiveType::Real) => 8,
        TypeInfo::Record(record) => record.fields.iter().map(|(_, ty)| alignment(ty)).max().unwrap_or(4).max(4),
        TypeInfo::Array { element, .. } => alignment(element).max(4),
        _ => 4,
    }
}

/// 配列の先頭から最初の要素までのバイト数
pub fn array_data_offset(element: &TypeInfo) -> u32 {
    align_up(ARRAY_HEADER_SIZE, alignment(element))
}

/// 静的に決まるバイト数
pub fn size_of(ty: &TypeInfo) -> Result<u32> {
    match ty {
        TypeInfo::Primitive(PrimitiveType::Integer | PrimitiveType::Boolean) => Ok(4),
        TypeInfo::Primitive(PrimitiveType::Real) => Ok(8),
        TypeInfo::Record(record) => {
            let mut offset = 0u32;
            for (_, field) in &record.fields {
                offset = checked_add(checked_align_up(offset, alignment(field))?, size_of(field)?)?;
            }
            checked_align_up(offset, alignment(ty))
        }
        TypeInfo::Array { element, size: Some(len) } => {
            let stride = size_of(element)?;
            let len = u32::try_from(*len).map_err(|_| too_large())?;
            let elements = stride.checked_mul(len).ok_or_else(too_large)?;
            checked_add(array_data_offset(element), elements)
        }
        TypeInfo::Array { size: None, .. } => Err(CompilerError::codegen(
            format!("Type '{}' has no static size", ty),
            None,
        )),
        TypeInfo::Primitive(PrimitiveType::Void) | TypeInfo::Error => {
            Err(CompilerError::internal(format!("型 '{}' はメモリに配置できません", ty)))
        }
    }
}

/// レコード内のフィールドのオフセットと型
pub fn field_offset<'r>(record: &'r RecordType, name: &str) -> Result<(u32, &'r TypeInfo)> {
    let mut offset = 0u32;
    for (field, ty) in &record.fields {
        offset = checked_align_up(offset, alignment(ty))?;
        if field == name {
            return Ok((offset, ty));
        }
        offset = checked_add(offset, size_of(ty)?)?;
    }
    Err(CompilerError::internal(format!(
        "レコード '{}' にフィールド '{}' がありません",
        record.name, name
    )))
}

fn checked_add(a: u32, b: u32) -> Result<u32> {
    a.checked_add(b).ok_or_else(too_large)
}

fn too_large() -> CompilerError {
    CompilerError::codegen("Aggregate type is too large for linear memory", None)
}

/// 静的領域の割り当て
///
/// メモリイメージは持たず、確保済みの末尾と配列ヘッダの値だけを記録する。
/// ヘッダ以外のバイトはインスタンス化時点で 0 なので、データセグメントにはヘッダだけを出す。
#[derive(Debug, Default)]
pub struct StaticMemory {
    /// 確保済み領域の末尾
    end: u32,
    /// 配列ヘッダ（アドレス, 長さ）。アドレス順に並ぶ。
    headers: Vec<(u32, u32)>,
}

impl StaticMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用中のバイト数
    pub fn size(&self) -> u32 {
        self.end
    }

    pub fn is_used(&self) -> bool {
        self.end > 0
    }

    /// 必要なページ数（最低1）
    pub fn pages(&self) -> u32 {
        self.end.div_ceil(PAGE_SIZE).max(1)
    }

    /// 型に合った領域を確保し、配列ヘッダを記録してアドレスを返す
    pub fn allocate(&mut self, ty: &TypeInfo) -> Result<u32> {
        let address = checked_align_up(self.end, alignment(ty))?;
        let end = checked_add(address, size_of(ty)?)?;
        let pages = end.div_ceil(PAGE_SIZE);
        if pages > MAX_PAGES {
            return Err(CompilerError::codegen(
                format!("Static data needs {} pages, but linear memory is limited to {}", pages, MAX_PAGES),
                None,
            ));
        }
        self.write_headers(ty, address)?;
        self.end = end;
        log::debug!("静的領域を確保: {} バイト @ {} ({})", end - address, address, ty);
        Ok(address)
    }

    fn write_headers(&mut self, ty: &TypeInfo, address: u32) -> Result<()> {
        match ty {
            TypeInfo::Array { element, size: Some(len) } => {
                let len = u32::try_from(*len).map_err(|_| too_large())?;
                self.headers.push((address, len));
                if element.is_aggregate() {
                    let stride = size_of(element)?;
                    let base = address + array_data_offset(element);
                    for index in 0..len {
                        self.write_headers(element, base + index * stride)?;
                    }
                }
            }
            TypeInfo::Record(record) => {
                for (name, field) in &record.fields {
                    if field.is_aggregate() {
                        let (offset, _) = field_offset(record, name)?;
                        self.write_headers(field, address + offset)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// 配列ヘッダのデータセグメント
    ///
    /// 間隔が `SEGMENT_GAP` バイト以下のヘッダは一つのセグメントにまとめ、両端の 0 を落とす。
    pub fn data_segments(&self) -> Vec<DataSegment> {
        let mut segments: Vec<DataSegment> = Vec::new();
        for &(address, len) in &self.headers {
            let bytes = len.to_le_bytes();
            match segments.last_mut() {
                Some(last) if address.saturating_sub(segment_end(last)) <= SEGMENT_GAP => {
                    let gap = address.saturating_sub(segment_end(last)) as usize;
                    last.bytes.resize(last.bytes.len() + gap, 0);
                    last.bytes.extend_from_slice(&bytes);
                }
                _ => segments.push(DataSegment { offset: address, bytes: bytes.to_vec() }),
            }
        }
        segments.into_iter().filter_map(trim_segment).collect()
    }
}

fn segment_end(segment: &DataSegment) -> u32 {
    segment.offset + segment.bytes.len() as u32
}

fn trim_segment(segment: DataSegment) -> Option<DataSegment> {
    let first = segment.bytes.iter().position(|byte| *byte != 0)?;
    let last = segment.bytes.iter().rposition(|byte| *byte != 0)?;
    Some(DataSegment {
        offset: segment.offset + first as u32,
        bytes: segment.bytes[first..=last].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> TypeInfo {
        TypeInfo::Record(RecordType {
            name: "Point".to_string(),
            fields: vec![("x".to_string(), TypeInfo::INTEGER), ("y".to_string(), TypeInfo::REAL)],
        })
    }

    #[test]
    fn record_fields_are_naturally_aligned() {
        let TypeInfo::Record(record) = point() else { unreachable!() };
        assert_eq!(field_offset(&record, "x").unwrap().0, 0);
        assert_eq!(field_offset(&record, "y").unwrap().0, 8);
        assert_eq!(size_of(&point()).unwrap(), 16);
    }

    #[test]
    fn nested_array_headers_are_written() {
        let inner = TypeInfo::array(TypeInfo::INTEGER, Some(2));
        let outer = TypeInfo::array(inner, Some(3));
        let mut memory = StaticMemory::new();
        let address = memory.allocate(&outer).unwrap();
        assert_eq!(address, 0);
        // 4 + 3 * (4 + 2 * 4)
        assert_eq!(memory.size(), 40);

        let segments = memory.data_segments();
        assert_eq!(segments.len(), 1);
        let bytes = &segments[0].bytes;
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &2u32.to_le_bytes());
    }

    #[test]
    fn huge_arrays_only_record_their_header() {
        let mut memory = StaticMemory::new();
        let address = memory.allocate(&TypeInfo::array(TypeInfo::INTEGER, Some(900_000_000))).unwrap();
        assert_eq!(address, 0);
        assert_eq!(memory.size(), 3_600_000_004);
        assert_eq!(memory.pages(), 54_932);
        // 900000000 = 0x35A4E900。先頭の 0 バイトは落とす
        assert_eq!(memory.data_segments(), vec![DataSegment { offset: 1, bytes: vec![0xE9, 0xA4, 0x35] }]);
    }

    #[test]
    fn address_space_overflow_is_an_error() {
        let half = TypeInfo::array(TypeInfo::INTEGER, Some(600_000_000));
        let mut memory = StaticMemory::new();
        memory.allocate(&half).unwrap();
        let error = memory.allocate(&half).unwrap_err();
        assert!(matches!(error, CompilerError::CodeGen { .. }));
        // 失敗した確保は末尾を動かさない
        assert_eq!(memory.size(), 2_400_000_004);

        let too_big = TypeInfo::array(TypeInfo::REAL, Some(600_000_000));
        assert!(StaticMemory::new().allocate(&too_big).is_err());
    }

    #[test]
    fn distant_headers_get_separate_segments() {
        let mut memory = StaticMemory::new();
        memory.allocate(&TypeInfo::array(TypeInfo::INTEGER, Some(20))).unwrap();
        let second = memory.allocate(&TypeInfo::array(TypeInfo::INTEGER, Some(1))).unwrap();
        assert_eq!(second, 84);
        assert_eq!(
            memory.data_segments(),
            vec![
                DataSegment { offset: 0, bytes: vec![20] },
                DataSegment { offset: 84, bytes: vec![1] },
            ]
        );
    }

    #[test]
    fn unsized_arrays_have_no_static_size() {
        assert!(size_of(&TypeInfo::array(TypeInfo::INTEGER, None)).is_err());
    }
}
