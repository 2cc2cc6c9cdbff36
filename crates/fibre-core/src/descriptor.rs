//! Area-copy command descriptor encoding.
//!
//! A descriptor is a fixed run of words placed in device memory before the
//! execute command is issued. The first two words hold a 32-bit opcode and
//! flag field, low half first.

use thiserror::Error;
use tracing::warn;

/// Foreground/background raster-function map.
pub const FB_MAP: [u8; 64] = [
    0x40, 0x40, 0x40, 0x40, 0x45, 0x45, 0x45, 0x45, //
    0x4a, 0x4a, 0x4a, 0x4a, 0x4f, 0x4f, 0x4f, 0x4f, //
    0x40, 0x44, 0x48, 0x22, 0x41, 0x45, 0x49, 0x4d, //
    0x42, 0x46, 0x4a, 0x4e, 0x00, 0x47, 0x4b, 0x4f, //
    0x40, 0x41, 0x42, 0x00, 0x44, 0x45, 0x46, 0x47, //
    0x48, 0x49, 0x4a, 0x4b, 0x22, 0x4d, 0x4e, 0x4f, //
    0x40, 0x45, 0x4a, 0x4f, 0x40, 0x45, 0x4a, 0x4f, //
    0x40, 0x45, 0x4a, 0x4f, 0x40, 0x45, 0x4a, 0x4f, //
];

/// Single-source raster-function map.
pub const SS_MAP: [u8; 32] = [
    0x40, 0x41, 0x42, 0x00, 0x44, 0x45, 0x46, 0x47, //
    0x48, 0x49, 0x4a, 0x4b, 0x22, 0x4d, 0x4e, 0x4f, //
    0x40, 0x44, 0x48, 0x22, 0x41, 0x45, 0x49, 0x4d, //
    0x42, 0x46, 0x4a, 0x4e, 0x00, 0x47, 0x4b, 0x4f, //
];

/// Flag: descriptor carries a source bitmap.
pub const FLAG_SOURCE_PRESENT: u32 = 1 << 8;
/// Flag: descriptor carries a mask bitmap.
pub const FLAG_MASK_PRESENT: u32 = 1 << 11;
/// Shift of the three map-selector bits.
pub const MAP_SHIFT: u32 = 17;
/// Shift of the two clip-mode bits.
pub const CLIP_MODE_SHIFT: u32 = 20;

/// Word offset of the linked-list next pointer.
pub const NEXT_OFFSET: usize = 2;
/// Word offset of the source sub-bitmap record.
pub const SOURCE_OFFSET: usize = 4;
/// Word offset of the mask sub-bitmap record.
pub const MASK_OFFSET: usize = 11;
/// Word offset of the destination sub-bitmap record.
pub const DESTINATION_OFFSET: usize = 20;
/// Word offset of the raster-operation nibble.
pub const FUNCTION_OFFSET: usize = 27;
/// Word offset of the clip section.
pub const CLIP_OFFSET: usize = 29;

/// Device command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    CopyArea = 1,
    DrawCurve = 2,
    PrintText = 3,
    FloodArea = 4,
    LoadCursor = 5,
    SetCursorPosition = 6,
    AttachCursor = 7,
    GetCursorPosition = 8,
    MoveObject = 9,
    ReportStatus = 10,
    FillArea = 11,
    GetMousePosition = 12,
    SetMouseCharacteristics = 13,
    GetTabletPosition = 14,
    SetPointingDeviceReporting = 15,
    SetTabletCharacteristics = 16,
}

impl Opcode {
    /// Converts a raw opcode value into an assigned opcode.
    #[must_use]
    pub const fn from_u8(op: u8) -> Option<Self> {
        match op {
            1 => Some(Self::CopyArea),
            2 => Some(Self::DrawCurve),
            3 => Some(Self::PrintText),
            4 => Some(Self::FloodArea),
            5 => Some(Self::LoadCursor),
            6 => Some(Self::SetCursorPosition),
            7 => Some(Self::AttachCursor),
            8 => Some(Self::GetCursorPosition),
            9 => Some(Self::MoveObject),
            10 => Some(Self::ReportStatus),
            11 => Some(Self::FillArea),
            12 => Some(Self::GetMousePosition),
            13 => Some(Self::SetMouseCharacteristics),
            14 => Some(Self::GetTabletPosition),
            15 => Some(Self::SetPointingDeviceReporting),
            16 => Some(Self::SetTabletCharacteristics),
            _ => None,
        }
    }

    /// Raw opcode value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Raster-function map selected by the kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RasterMap {
    /// Foreground/background operations ([`FB_MAP`]).
    ForegroundBackground,
    /// Single-source operations ([`SS_MAP`]).
    SingleSource,
}

impl RasterMap {
    /// Table backing this map.
    #[must_use]
    pub const fn table(self) -> &'static [u8] {
        match self {
            Self::ForegroundBackground => &FB_MAP,
            Self::SingleSource => &SS_MAP,
        }
    }
}

/// Errors raised while building a descriptor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Logical function index is past the end of the selected map.
    #[error("raster function {index} out of range for {map:?} map")]
    FunctionOutOfRange {
        /// Requested logical index.
        index: u8,
        /// Map that was consulted.
        map: RasterMap,
    },
}

/// Logical raster function resolved to its device-native byte.
///
/// Serialized as its map and index; the device byte is resolved again on
/// load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(try_from = "RasterSelection", into = "RasterSelection")
)]
pub struct RasterFunction {
    index: u8,
    map: RasterMap,
    device: u8,
}

impl RasterFunction {
    /// Resolves `index` through `map`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::FunctionOutOfRange`] when `index` has no
    /// entry in the map.
    pub fn new(map: RasterMap, index: u8) -> Result<Self, DescriptorError> {
        let device = map
            .table()
            .get(usize::from(index))
            .copied()
            .ok_or(DescriptorError::FunctionOutOfRange { index, map })?;
        Ok(Self { index, map, device })
    }

    /// Logical index as requested.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.index
    }

    /// Map the index was resolved through.
    #[must_use]
    pub const fn map(self) -> RasterMap {
        self.map
    }

    /// Device-native function byte.
    #[must_use]
    pub const fn device_byte(self) -> u8 {
        self.device
    }

    /// Map-selector bits (high nibble of the device byte).
    #[must_use]
    pub const fn map_bits(self) -> u32 {
        (self.device >> 4) as u32
    }

    /// Raster-operation nibble (low nibble of the device byte).
    #[must_use]
    pub const fn operation(self) -> u16 {
        (self.device & 0x0F) as u16
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize, serde::Serialize)]
struct RasterSelection {
    map: RasterMap,
    index: u8,
}

#[cfg(feature = "serde")]
impl TryFrom<RasterSelection> for RasterFunction {
    type Error = DescriptorError;

    fn try_from(selection: RasterSelection) -> Result<Self, Self::Error> {
        Self::new(selection.map, selection.index)
    }
}

#[cfg(feature = "serde")]
impl From<RasterFunction> for RasterSelection {
    fn from(function: RasterFunction) -> Self {
        Self {
            map: function.map,
            index: function.index,
        }
    }
}

/// Pixel coordinate within a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Point {
    /// Horizontal offset.
    pub x: u16,
    /// Vertical offset.
    pub y: u16,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Clip rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Bitmap geometry shared by every operand of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Bitmap {
    /// Device address of the first word.
    pub address: u32,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Bits per pixel.
    pub bits_per_pixel: u16,
}

/// The monochrome frame buffer every session copies within.
pub const SCREEN: Bitmap = Bitmap {
    address: 0x0010_0000,
    width: 1088,
    height: 864,
    bits_per_pixel: 1,
};

/// Optional mask operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Mask {
    /// Device address of the mask bitmap.
    pub address: u32,
    /// Offset of the mask's active region.
    pub offset: Point,
}

/// High-level area-copy request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CopyAreaRequest {
    /// Offset within the source bitmap.
    pub source: Point,
    /// Width of the copied area.
    pub width: u16,
    /// Height of the copied area.
    pub height: u16,
    /// Offset within the destination bitmap.
    pub destination: Point,
    /// Clip rectangles; zero, one, or many.
    pub clips: Vec<Rect>,
    /// Raster function.
    pub function: RasterFunction,
    /// Mask operand; absent or at address zero means no mask.
    pub mask: Option<Mask>,
    /// Source bitmap.
    pub source_bitmap: Bitmap,
    /// Destination bitmap.
    pub destination_bitmap: Bitmap,
}

impl CopyAreaRequest {
    /// Copy used by the scripted bring-up: 48x2 pixels from (1,0) to (96,0)
    /// on the screen, single-source function 3, no clips, no mask.
    #[must_use]
    pub fn bring_up() -> Self {
        Self {
            source: Point::new(1, 0),
            width: 48,
            height: 2,
            destination: Point::new(96, 0),
            clips: Vec::new(),
            function: RasterFunction {
                index: 3,
                map: RasterMap::SingleSource,
                device: SS_MAP[3],
            },
            mask: None,
            source_bitmap: SCREEN,
            destination_bitmap: SCREEN,
        }
    }

    /// Clip encoding selected by the number of clip rectangles.
    #[must_use]
    pub fn clip_mode(&self) -> ClipMode {
        match self.clips.as_slice() {
            [] => ClipMode::None,
            [single] => ClipMode::Single(*single),
            many => {
                let count = u16::try_from(many.len()).unwrap_or_else(|_| {
                    warn!(len = many.len(), "clip list count capped at {}", u16::MAX);
                    u16::MAX
                });
                ClipMode::List { count }
            }
        }
    }

    fn effective_mask(&self) -> Option<Mask> {
        self.mask.filter(|mask| mask.address != 0)
    }

    /// Encodes the request into descriptor words.
    #[must_use]
    pub fn encode(&self) -> Vec<u16> {
        let clip_mode = self.clip_mode();
        let mask = self.effective_mask();

        let mut flags = u32::from(Opcode::CopyArea.as_u8()) | FLAG_SOURCE_PRESENT;
        if mask.is_some() {
            flags |= FLAG_MASK_PRESENT;
        }
        flags |= self.function.map_bits() << MAP_SHIFT;
        flags |= clip_mode.bits() << CLIP_MODE_SHIFT;

        let mut words = vec![0_u16; clip_mode.descriptor_len()];
        put_u32(&mut words, 0, flags);
        put_u32(&mut words, NEXT_OFFSET, 0);

        put_sub_bitmap(&mut words, SOURCE_OFFSET, &self.source_bitmap, self.source);

        if let Some(mask) = mask {
            let bitmap = Bitmap {
                address: mask.address,
                ..self.source_bitmap
            };
            put_sub_bitmap(&mut words, MASK_OFFSET, &bitmap, mask.offset);
            words[MASK_OFFSET + 7] = self.width;
            words[MASK_OFFSET + 8] = self.height;
        }

        put_sub_bitmap(
            &mut words,
            DESTINATION_OFFSET,
            &self.destination_bitmap,
            self.destination,
        );

        words[FUNCTION_OFFSET] = self.function.operation();

        match clip_mode {
            ClipMode::None => {}
            ClipMode::Single(rect) => {
                words[CLIP_OFFSET] = rect.x;
                words[CLIP_OFFSET + 1] = rect.y;
                words[CLIP_OFFSET + 2] = rect.width;
                words[CLIP_OFFSET + 3] = rect.height;
            }
            ClipMode::List { count } => {
                // Rectangle storage is not laid out yet; only the count is sent.
                warn!(count, "clip list encoded without its rectangles");
                put_u32(&mut words, CLIP_OFFSET, 0);
                words[CLIP_OFFSET + 2] = count;
            }
        }

        words
    }
}

/// How clip rectangles are carried in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipMode {
    /// Unclipped.
    None,
    /// One rectangle stored inline.
    Single(Rect),
    /// List pointer (always zero) followed by the rectangle count.
    List {
        /// Number of rectangles.
        count: u16,
    },
}

impl ClipMode {
    /// Two-bit clip-mode selector.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::List { .. } => 2,
        }
    }

    /// Descriptor length in words for this clip mode.
    #[must_use]
    pub const fn descriptor_len(self) -> usize {
        match self {
            Self::None => CLIP_OFFSET,
            Self::Single(_) => CLIP_OFFSET + 4,
            Self::List { .. } => CLIP_OFFSET + 3,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn put_u32(words: &mut [u16], offset: usize, value: u32) {
    words[offset] = value as u16;
    words[offset + 1] = (value >> 16) as u16;
}

fn put_sub_bitmap(words: &mut [u16], offset: usize, bitmap: &Bitmap, origin: Point) {
    put_u32(words, offset, bitmap.address);
    words[offset + 2] = bitmap.width;
    words[offset + 3] = bitmap.height;
    words[offset + 4] = bitmap.bits_per_pixel;
    words[offset + 5] = origin.x;
    words[offset + 6] = origin.y;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        ClipMode, CopyAreaRequest, DescriptorError, Mask, Opcode, Point, RasterFunction,
        RasterMap, Rect, CLIP_OFFSET, FB_MAP, MASK_OFFSET, SS_MAP,
    };

    #[test]
    fn map_sizes_match_function_space() {
        assert_eq!(FB_MAP.len(), 64);
        assert_eq!(SS_MAP.len(), 32);
        assert_eq!(RasterMap::ForegroundBackground.table().len(), 64);
        assert_eq!(RasterMap::SingleSource.table().len(), 32);
    }

    #[rstest]
    #[case(RasterMap::SingleSource, 3, 0x00)]
    #[case(RasterMap::SingleSource, 12, 0x22)]
    #[case(RasterMap::SingleSource, 31, 0x4f)]
    #[case(RasterMap::ForegroundBackground, 4, 0x45)]
    #[case(RasterMap::ForegroundBackground, 19, 0x22)]
    #[case(RasterMap::ForegroundBackground, 63, 0x4f)]
    fn functions_resolve_through_selected_map(
        #[case] map: RasterMap,
        #[case] index: u8,
        #[case] device: u8,
    ) {
        let function = RasterFunction::new(map, index).expect("index in range");
        assert_eq!(function.device_byte(), device);
        assert_eq!(function.index(), index);
        assert_eq!(function.map(), map);
        assert_eq!(function.map_bits(), u32::from(device >> 4));
        assert_eq!(function.operation(), u16::from(device & 0x0F));
    }

    #[test]
    fn out_of_range_function_is_rejected() {
        assert_eq!(
            RasterFunction::new(RasterMap::SingleSource, 32),
            Err(DescriptorError::FunctionOutOfRange {
                index: 32,
                map: RasterMap::SingleSource
            })
        );
        assert!(RasterFunction::new(RasterMap::ForegroundBackground, 32).is_ok());
    }

    #[test]
    fn opcode_table_is_bijective() {
        for raw in 1_u8..=16 {
            let op = Opcode::from_u8(raw).expect("assigned opcode");
            assert_eq!(op.as_u8(), raw);
        }
        assert!(Opcode::from_u8(0).is_none());
        assert!(Opcode::from_u8(17).is_none());
    }

    #[test]
    fn bring_up_copy_matches_reference_encoding() {
        let words = CopyAreaRequest::bring_up().encode();

        #[rustfmt::skip]
        let expected: [u16; 29] = [
            0x0101, 0x0000,                                // copy area, source present
            0x0000, 0x0000,                                // next
            0x0000, 0x0010, 1088, 864, 1, 1, 0,            // source
            0, 0, 0, 0, 0, 0, 0, 0, 0,                     // mask (absent)
            0x0000, 0x0010, 1088, 864, 1, 96, 0,           // destination
            0x0000,                                        // raster operation
            0x0000,
        ];
        assert_eq!(words, expected);
    }

    #[test]
    fn mask_sets_flag_and_fills_record() {
        let mut request = CopyAreaRequest::bring_up();
        request.mask = Some(Mask {
            address: 0x0001_0000,
            offset: Point::new(50, 0),
        });

        let words = request.encode();

        assert_eq!(words[0], 0x0901);
        assert_eq!(
            &words[MASK_OFFSET..MASK_OFFSET + 9],
            &[0x0000, 0x0001, 1088, 864, 1, 50, 0, 48, 2]
        );
    }

    #[test]
    fn mask_at_address_zero_counts_as_absent() {
        let mut request = CopyAreaRequest::bring_up();
        request.mask = Some(Mask {
            address: 0,
            offset: Point::new(50, 0),
        });

        let words = request.encode();

        assert_eq!(words, CopyAreaRequest::bring_up().encode());
    }

    #[test]
    fn map_bits_land_in_high_flag_word() {
        let mut request = CopyAreaRequest::bring_up();
        request.function =
            RasterFunction::new(RasterMap::SingleSource, 12).expect("index in range");

        let words = request.encode();

        // 0x22: map 2 at bit 17 (high word bit 1), operation 2.
        assert_eq!(words[1], 0x0004);
        assert_eq!(words[27], 0x0002);
    }

    #[test]
    fn single_clip_is_stored_inline() {
        let mut request = CopyAreaRequest::bring_up();
        let rect = Rect {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        request.clips = vec![rect];

        assert_eq!(request.clip_mode(), ClipMode::Single(rect));
        let words = request.encode();
        assert_eq!(words.len(), CLIP_OFFSET + 4);
        assert_eq!(words[1], 0x0010);
        assert_eq!(&words[CLIP_OFFSET..], &[10, 20, 30, 40]);
    }

    #[test]
    fn clip_list_carries_count_only() {
        let mut request = CopyAreaRequest::bring_up();
        request.clips = vec![Rect::default(); 3];

        assert_eq!(request.clip_mode(), ClipMode::List { count: 3 });
        let words = request.encode();
        assert_eq!(words.len(), CLIP_OFFSET + 3);
        assert_eq!(words[1], 0x0020);
        assert_eq!(&words[CLIP_OFFSET..], &[0, 0, 3]);
    }

    #[test]
    fn oversized_clip_list_count_saturates() {
        let mut request = CopyAreaRequest::bring_up();
        request.clips = vec![Rect::default(); usize::from(u16::MAX) + 2];

        assert_eq!(request.clip_mode(), ClipMode::List { count: u16::MAX });
        assert_eq!(request.encode()[CLIP_OFFSET + 2], u16::MAX);
    }
}
