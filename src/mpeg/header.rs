//! MPEG-1/2 video header classification
//!
//! Only the fields needed to build an index are extracted. Everything else
//! (slices, user data, quantiser matrices, unknown extensions) is skipped.

use super::bitreader::BitReader;
use crate::error::BitstreamError;

pub const PICTURE_START_CODE: u8 = 0x00;
pub const SLICE_START_CODE_MIN: u8 = 0x01;
pub const SLICE_START_CODE_MAX: u8 = 0xAF;
pub const USER_DATA_START_CODE: u8 = 0xB2;
pub const SEQUENCE_HEADER_CODE: u8 = 0xB3;
pub const SEQUENCE_ERROR_CODE: u8 = 0xB4;
pub const EXTENSION_START_CODE: u8 = 0xB5;
pub const SEQUENCE_END_CODE: u8 = 0xB7;
pub const GROUP_START_CODE: u8 = 0xB8;

const SEQUENCE_EXTENSION_ID: u32 = 1;
const SEQUENCE_DISPLAY_EXTENSION_ID: u32 = 2;
const PICTURE_CODING_EXTENSION_ID: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub horizontal_size: u16,
    pub vertical_size: u16,
    pub aspect_ratio_information: u8,
    pub frame_rate_code: u8,
    pub bit_rate_value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceExtension {
    pub profile_and_level: u8,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
    pub horizontal_size_extension: u8,
    pub vertical_size_extension: u8,
    pub frame_rate_extension_n: u8,
    pub frame_rate_extension_d: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceDisplayExtension {
    pub video_format: u8,
    /// Present only when the colour description flag is set
    pub matrix_coefficients: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopHeader {
    pub time_code: u32,
    pub closed_gop: bool,
    pub broken_link: bool,
}

/// Picture coding type as coded in the picture header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingType {
    I = 1,
    P = 2,
    B = 3,
}

impl CodingType {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::I),
            2 => Some(Self::P),
            3 => Some(Self::B),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    /// `Err` carries a reserved or MPEG-1 D-picture code.
    pub coding_type: Result<CodingType, u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureStructure {
    TopField,
    BottomField,
    Frame,
}

impl PictureStructure {
    pub fn is_field(self) -> bool {
        !matches!(self, Self::Frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureCodingExtension {
    /// `Err` carries the reserved value 0.
    pub picture_structure: Result<PictureStructure, u8>,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
}

/// A recognised header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Sequence(SequenceHeader),
    SequenceExtension(SequenceExtension),
    SequenceDisplayExtension(SequenceDisplayExtension),
    Gop(GopHeader),
    Picture(PictureHeader),
    PictureCodingExtension(PictureCodingExtension),
    SequenceEnd,
}

/// Classify the header behind start code `code`.
///
/// `payload` holds the bytes following the four start code bytes, up to the
/// next start code. Codes that carry nothing an index needs return
/// `Ok(None)`.
pub fn classify(code: u8, payload: &[u8]) -> Result<Option<Header>, BitstreamError> {
    let mut br = BitReader::new(payload);

    let header = match code {
        PICTURE_START_CODE => Header::Picture(parse_picture(&mut br)?),
        SEQUENCE_HEADER_CODE => Header::Sequence(parse_sequence(&mut br)?),
        GROUP_START_CODE => Header::Gop(parse_gop(&mut br)?),
        SEQUENCE_END_CODE => Header::SequenceEnd,
        EXTENSION_START_CODE => match br.read_bits(4)? {
            SEQUENCE_EXTENSION_ID => Header::SequenceExtension(parse_sequence_extension(&mut br)?),
            SEQUENCE_DISPLAY_EXTENSION_ID => {
                Header::SequenceDisplayExtension(parse_sequence_display(&mut br)?)
            }
            PICTURE_CODING_EXTENSION_ID => {
                Header::PictureCodingExtension(parse_picture_coding_extension(&mut br)?)
            }
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };

    Ok(Some(header))
}

fn parse_sequence(br: &mut BitReader) -> Result<SequenceHeader, BitstreamError> {
    let horizontal_size = br.read_bits(12)? as u16;
    let vertical_size = br.read_bits(12)? as u16;
    let aspect_ratio_information = br.read_bits(4)? as u8;
    let frame_rate_code = br.read_bits(4)? as u8;
    let bit_rate_value = br.read_bits(18)?;

    Ok(SequenceHeader {
        horizontal_size,
        vertical_size,
        aspect_ratio_information,
        frame_rate_code,
        bit_rate_value,
    })
}

fn parse_sequence_extension(br: &mut BitReader) -> Result<SequenceExtension, BitstreamError> {
    let profile_and_level = br.read_bits(8)? as u8;
    let progressive_sequence = br.read_flag()?;
    let chroma_format = br.read_bits(2)? as u8;
    let horizontal_size_extension = br.read_bits(2)? as u8;
    let vertical_size_extension = br.read_bits(2)? as u8;
    // bit_rate_extension, marker_bit, vbv_buffer_size_extension, low_delay
    br.skip_bits(12 + 1 + 8 + 1)?;
    let frame_rate_extension_n = br.read_bits(2)? as u8;
    let frame_rate_extension_d = br.read_bits(5)? as u8;

    Ok(SequenceExtension {
        profile_and_level,
        progressive_sequence,
        chroma_format,
        horizontal_size_extension,
        vertical_size_extension,
        frame_rate_extension_n,
        frame_rate_extension_d,
    })
}

fn parse_sequence_display(br: &mut BitReader) -> Result<SequenceDisplayExtension, BitstreamError> {
    let video_format = br.read_bits(3)? as u8;
    let matrix_coefficients = if br.read_flag()? {
        // colour_primaries, transfer_characteristics
        br.skip_bits(16)?;
        Some(br.read_bits(8)? as u8)
    } else {
        None
    };

    Ok(SequenceDisplayExtension {
        video_format,
        matrix_coefficients,
    })
}

fn parse_gop(br: &mut BitReader) -> Result<GopHeader, BitstreamError> {
    let time_code = br.read_bits(25)?;
    let closed_gop = br.read_flag()?;
    let broken_link = br.read_flag()?;

    Ok(GopHeader {
        time_code,
        closed_gop,
        broken_link,
    })
}

fn parse_picture(br: &mut BitReader) -> Result<PictureHeader, BitstreamError> {
    let temporal_reference = br.read_bits(10)? as u16;
    let code = br.read_bits(3)?;

    Ok(PictureHeader {
        temporal_reference,
        coding_type: CodingType::from_code(code).ok_or(code as u8),
    })
}

fn parse_picture_coding_extension(
    br: &mut BitReader,
) -> Result<PictureCodingExtension, BitstreamError> {
    // f_code[2][2], intra_dc_precision
    br.skip_bits(16 + 2)?;
    let picture_structure = match br.read_bits(2)? {
        1 => Ok(PictureStructure::TopField),
        2 => Ok(PictureStructure::BottomField),
        3 => Ok(PictureStructure::Frame),
        reserved => Err(reserved as u8),
    };
    let top_field_first = br.read_flag()?;
    // frame_pred_frame_dct, concealment_motion_vectors, q_scale_type,
    // intra_vlc_format, alternate_scan
    br.skip_bits(5)?;
    let repeat_first_field = br.read_flag()?;
    // chroma_420_type
    br.skip_bits(1)?;
    let progressive_frame = br.read_flag()?;

    Ok(PictureCodingExtension {
        picture_structure,
        top_field_first,
        repeat_first_field,
        progressive_frame,
    })
}
