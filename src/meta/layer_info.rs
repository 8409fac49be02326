
//! Additional layer information: tagged blocks that follow each layer record,
//! and the global blocks that follow the layer list.

use crate::io::*;
use crate::error::{Result, UnitResult, Error, i32_to_usize, i64_to_usize, u64_to_usize};
use crate::context::Context;
use crate::math::{Vec2, Matrix3};
use crate::meta::descriptor::{Descriptor, Element};
use crate::meta::engine_data::EngineData;


/// Reads or writes a nested layer list, which lives in the file structure
/// rather than in a single block. Receives the end of the block when reading.
pub type NestedLayers<'f, S> = dyn FnMut(&mut Tracking<S>, usize) -> UnitResult + 'f;


/// A tagged block of additional information.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerInfo {

    /// `Layr`, `Lr16` or `Lr32`: the layer list of a 16 or 32 bit document.
    /// The layers themselves are moved into the layer list of the file.
    InfoLayers { key: FourCc },

    /// `lsct` or `lsdk`: marks the start or end of a group.
    Section(SectionInfo),

    /// `luni`: the unicode name, which overrides the pascal name.
    UnicodeName(String),

    /// `TySh`: a text layer.
    TypeTool(TypeToolInfo),

    /// `SoLd`: a placed smart object.
    Placed(PlacedLayer),

    /// `lyid`
    LayerId(i32),

    /// `lnkD`, `lnkE`, `lnk2` or `lnk3`.
    LinkedFiles { key: FourCc, files: Vec<LinkedFile> },

    /// Any block that is not decoded, preserved byte by byte.
    Raw { signature: FourCc, key: FourCc, data: Vec<u8> },
}

/// The kind of a section marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Layer,
    OpenFolder,
    ClosedFolder,

    /// The hidden layer that closes a group.
    Divider,
}

/// A group marker.
#[derive(Clone, Debug, PartialEq)]
pub struct SectionInfo {
    pub key: FourCc,
    pub kind: SectionKind,

    /// Present if the block has at least 12 bytes.
    pub blend_mode: Option<FourCc>,

    /// Present if the block has at least 16 bytes. 0 is normal, 1 is a scene group.
    pub subtype: Option<i32>,
}

/// The affine transform of a text layer.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TextTransform {
    pub xx: f64,
    pub xy: f64,
    pub yx: f64,
    pub yy: f64,
    pub tx: f64,
    pub ty: f64,
}

/// Type tool data of a text layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeToolInfo {
    pub version: i16,
    pub transform: TextTransform,
    pub text_version: i16,
    pub text_descriptor_version: i32,
    pub text: Descriptor,
    pub warp_version: i16,
    pub warp_descriptor_version: i32,
    pub warp: Descriptor,

    /// Parsed from the `EngineData` element of the text descriptor.
    /// Replaces that element when saving.
    pub engine_data: Option<EngineData>,

    /// Bytes after the warp descriptor, usually the four-byte text rectangle.
    pub trailing: Vec<u8>,
}

/// A placed smart object.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLayer {

    /// `soLD` or `plcL`.
    pub kind: FourCc,

    pub version: i32,
    pub descriptor_version: i32,
    pub descriptor: Descriptor,
}

/// Where the contents of a linked file are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkedFileKind {

    /// `liFD`: the file is embedded.
    Data,

    /// `liFE`: the file is external.
    External,

    /// `liFA`: the file is an alias.
    Alias,
}

/// The modification date of an external linked file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkedFileDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub seconds: f64,
}

/// A single linked file entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedFile {
    pub kind: LinkedFileKind,
    pub version: i32,

    /// Referenced by the `Idnt` of placed layers.
    pub id: String,

    /// The original file name, including its extension.
    pub name: String,

    pub file_type: FourCc,
    pub creator: FourCc,
    pub open_descriptor: Option<(u32, Descriptor)>,

    /// External files only.
    pub linked_descriptor: Option<(u32, Descriptor)>,

    /// External files with version 4 or later only.
    pub modified: Option<LinkedFileDate>,

    /// External files only.
    pub external_file_size: u64,

    /// The embedded file contents. Empty for aliases.
    pub data: Vec<u8>,

    pub child_document_id: Option<String>,
    pub asset_modification_time: Option<f64>,
    pub asset_locked: Option<bool>,
}


/// Keys whose length field has 8 bytes in large documents.
const LONG_LENGTH_KEYS: [[u8; 4]; 13] = [
    *b"LMsk", *b"Lr16", *b"Lr32", *b"Layr", *b"Mt16", *b"Mt32", *b"Mtrn",
    *b"Alph", *b"FMsk", *b"lnk2", *b"FEid", *b"FXid", *b"PxSD",
];

/// Whether the length of a block is stored with 8 bytes.
/// `8B64` blocks are treated as long in standard documents too,
/// although Photoshop only writes them in large documents.
pub fn has_long_length(signature: FourCc, key: FourCc, large_document: bool) -> bool {
    if signature == *b"8B64" { return true; }
    large_document && LONG_LENGTH_KEYS.contains(&key.0)
}


impl SectionKind {
    fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            0 => SectionKind::Layer,
            1 => SectionKind::OpenFolder,
            2 => SectionKind::ClosedFolder,
            3 => SectionKind::Divider,
            _ => return Err(Error::invalid("layer section type")),
        })
    }

    fn code(self) -> i32 {
        match self {
            SectionKind::Layer => 0,
            SectionKind::OpenFolder => 1,
            SectionKind::ClosedFolder => 2,
            SectionKind::Divider => 3,
        }
    }

    /// Whether this marker starts a group.
    pub fn is_folder(self) -> bool {
        matches!(self, SectionKind::OpenFolder | SectionKind::ClosedFolder)
    }
}

impl SectionInfo {

    /// An `lsct` marker with a blend mode but without subtype.
    pub fn new(kind: SectionKind, blend_mode: FourCc) -> Self {
        SectionInfo { key: FourCc(*b"lsct"), kind, blend_mode: Some(blend_mode), subtype: None }
    }

    fn read(read: &mut impl Read, key: FourCc, length: usize) -> Result<Self> {
        let kind = SectionKind::from_code(i32::read(read)?)?;
        let mut blend_mode = None;
        let mut subtype = None;

        if length >= 12 {
            if FourCc::read(read)? != *b"8BIM" {
                return Err(Error::invalid("section divider signature"));
            }

            blend_mode = Some(FourCc::read(read)?);

            if length >= 16 {
                subtype = Some(i32::read(read)?);
            }
        }

        Ok(SectionInfo { key, kind, blend_mode, subtype })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        self.kind.code().write(write)?;

        if let Some(blend_mode) = self.blend_mode {
            FourCc(*b"8BIM").write(write)?;
            blend_mode.write(write)?;

            if let Some(subtype) = self.subtype {
                subtype.write(write)?;
            }
        }

        Ok(())
    }
}

impl TextTransform {

    /// The length of the transformed axes.
    pub fn scale(&self) -> Vec2<f64> {
        Vec2(
            (self.xx * self.xx + self.yx * self.yx).sqrt(),
            (self.xy * self.xy + self.yy * self.yy).sqrt(),
        )
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        Ok(TextTransform {
            xx: f64::read(read)?, xy: f64::read(read)?,
            yx: f64::read(read)?, yy: f64::read(read)?,
            tx: f64::read(read)?, ty: f64::read(read)?,
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        f64::write_slice(write, &[ self.xx, self.xy, self.yx, self.yy, self.tx, self.ty ])
    }
}

impl TypeToolInfo {

    /// Create type tool data with the versions Photoshop writes.
    pub fn new(transform: TextTransform, text: Descriptor, warp: Descriptor, engine_data: Option<EngineData>) -> Self {
        TypeToolInfo {
            version: 1, transform,
            text_version: 50, text_descriptor_version: 16, text,
            warp_version: 1, warp_descriptor_version: 16, warp,
            engine_data,
            trailing: vec![ 0; 4 ],
        }
    }

    /// The string from `EngineDict/Editor/Text`.
    pub fn text_string(&self) -> Option<&str> {
        self.engine_data.as_ref()?
            .get_path(&[ "EngineDict", "Editor", "Text" ])?
            .as_text()
    }

    fn read<R: Read>(read: &mut Tracking<R>, end: usize) -> Result<Self> {
        let version = i16::read(read)?;
        let transform = TextTransform::read(read)?;
        let text_version = i16::read(read)?;
        let text_descriptor_version = i32::read(read)?;
        let text = Descriptor::read(read)?;
        let warp_version = i16::read(read)?;
        let warp_descriptor_version = i32::read(read)?;
        let warp = Descriptor::read(read)?;

        let trailing = read_bytes(read, end.saturating_sub(read.byte_position()))?;

        let engine_data = match text.get("EngineData") {
            Some(Element::RawData(bytes)) => Some(EngineData::read(bytes)?),
            _ => None,
        };

        Ok(TypeToolInfo {
            version, transform, text_version, text_descriptor_version, text,
            warp_version, warp_descriptor_version, warp, engine_data, trailing
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        let mut text = self.text.clone();

        if let Some(engine_data) = &self.engine_data {
            text.insert("EngineData", Element::RawData(engine_data.to_bytes()));
        }

        self.version.write(write)?;
        self.transform.write(write)?;
        self.text_version.write(write)?;
        self.text_descriptor_version.write(write)?;
        text.write(write)?;
        self.warp_version.write(write)?;
        self.warp_descriptor_version.write(write)?;
        self.warp.write(write)?;
        u8::write_slice(write, &self.trailing)
    }
}

impl PlacedLayer {

    /// The id of the linked file, from `Idnt`, without its trailing nul.
    pub fn unique_id(&self) -> Option<String> {
        let id = self.descriptor.get_text("Idnt")?;
        Some(id.strip_suffix('\0').unwrap_or(id).to_string())
    }

    /// The transform that maps the centered unit square onto the `Trnf` quad.
    pub fn transform(&self) -> Option<Matrix3> {
        let points = match self.descriptor.get("Trnf")? {
            Element::List(items) => items.iter()
                .map(Element::as_number)
                .collect::<Option<Vec<f64>>>()?,

            _ => return None,
        };

        if points.len() != 8 { return None; }
        let point = |index: usize| Vec2(points[index] as f32, points[index + 1] as f32);
        Some(Matrix3::from_quad(point(4), point(2), point(0), point(6)))
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        Ok(PlacedLayer {
            kind: FourCc::read(read)?,
            version: i32::read(read)?,
            descriptor_version: i32::read(read)?,
            descriptor: Descriptor::read(read)?,
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        self.kind.write(write)?;
        self.version.write(write)?;
        self.descriptor_version.write(write)?;
        self.descriptor.write(write)
    }
}


impl LinkedFileKind {
    fn from_code(code: FourCc) -> Result<Self> {
        Ok(match &code.0 {
            b"liFD" => LinkedFileKind::Data,
            b"liFE" => LinkedFileKind::External,
            b"liFA" => LinkedFileKind::Alias,
            _ => return Err(Error::invalid(format!("linked file type {:?}", code))),
        })
    }

    fn code(self) -> FourCc {
        FourCc(match self {
            LinkedFileKind::Data => *b"liFD",
            LinkedFileKind::External => *b"liFE",
            LinkedFileKind::Alias => *b"liFA",
        })
    }
}

impl LinkedFile {

    /// An embedded psb file, as Photoshop creates when converting a layer to a smart object.
    pub fn embedded(id: impl Into<String>, name: impl Into<String>, data: Vec<u8>) -> Self {
        let mut composition = Descriptor::new("\0", "null");
        composition.insert("compID", Element::Integer(-1));
        composition.insert("originalCompID", Element::Integer(-1));

        let mut open_descriptor = Descriptor::new("\0", "null");
        open_descriptor.insert("compInfo", Element::Descriptor(composition));

        LinkedFile {
            kind: LinkedFileKind::Data,
            version: 7,
            id: id.into(),
            name: name.into(),
            file_type: FourCc(*b"8BPB"),
            creator: FourCc(*b"8BIM"),
            open_descriptor: Some((16, open_descriptor)),
            linked_descriptor: None,
            modified: None,
            external_file_size: 0,
            data,
            child_document_id: Some("\0".to_string()),
            asset_modification_time: Some(0.0),
            asset_locked: Some(false),
        }
    }

    /// The file name without its extension.
    pub fn name_without_extension(&self) -> &str {
        let name = self.name.trim_end_matches('\0');

        match name.rfind('.') {
            Some(index) if index > 0 => &name[.. index],
            _ => name,
        }
    }

    /// Whether the embedded bytes look like a psd or psb file.
    pub fn is_embedded_document(&self) -> bool {
        self.data.starts_with(&crate::meta::magic_number::BYTES)
    }

    fn read<R: Read + Seek>(read: &mut Tracking<R>, end: usize) -> Result<Self> {
        let kind = LinkedFileKind::from_code(FourCc::read(read)?)?;
        let version = i32::read(read)?;
        let id = read_pascal_string(read, 1)?;
        let name = read_unicode_string(read)?;
        let file_type = FourCc::read(read)?;
        let creator = FourCc::read(read)?;
        let data_size = u64_to_usize(u64::read(read)?, "linked file size")?;

        let open_descriptor = if read_bool(read)? {
            let version = u32::read(read)?;
            Some((version, Descriptor::read(read)?))
        }
        else { None };

        let mut linked_descriptor = None;
        let mut modified = None;
        let mut external_file_size = 0;
        let mut data = Vec::new();

        if kind == LinkedFileKind::External {
            let descriptor_version = u32::read(read)?;
            linked_descriptor = Some((descriptor_version, Descriptor::read(read)?));

            // the date depends on the entry version, not the descriptor version
            if version > 3 {
                modified = Some(LinkedFileDate {
                    year: i32::read(read)?,
                    month: u8::read(read)?,
                    day: u8::read(read)?,
                    hour: u8::read(read)?,
                    minute: u8::read(read)?,
                    seconds: f64::read(read)?,
                });
            }

            external_file_size = u64::read(read)?;
        }

        match kind {
            LinkedFileKind::Alias => skip_bytes(read, 8)?,

            LinkedFileKind::Data => {
                if data_size > end.saturating_sub(read.byte_position()) {
                    return Err(Error::invalid("embedded file is larger than its entry"));
                }

                data = read_bytes(read, data_size)?;
            },

            LinkedFileKind::External => {},
        }

        let child_document_id = if version >= 5 { Some(read_unicode_string(read)?) } else { None };
        let asset_modification_time = if version >= 6 { Some(f64::read(read)?) } else { None };
        let asset_locked = if version >= 7 { Some(read_bool(read)?) } else { None };

        if kind == LinkedFileKind::External && version == 2 {
            let size = u64_to_usize(external_file_size, "external file size")?;
            if size > end.saturating_sub(read.byte_position()) {
                return Err(Error::invalid("external file is larger than its entry"));
            }

            data = read_bytes(read, size)?;
        }

        Ok(LinkedFile {
            kind, version, id, name, file_type, creator, open_descriptor,
            linked_descriptor, modified, external_file_size, data,
            child_document_id, asset_modification_time, asset_locked,
        })
    }

    fn write<W: Write>(&self, write: &mut Tracking<W>) -> UnitResult {
        let start = write.byte_position();

        self.kind.code().write(write)?;
        self.version.write(write)?;
        write_pascal_string(write, &self.id, 1)?;
        write_unicode_string(write, &self.name)?;
        self.file_type.write(write)?;
        self.creator.write(write)?;

        let data_size = match self.kind {
            LinkedFileKind::Data => self.data.len() as u64,
            _ => self.external_file_size,
        };

        data_size.write(write)?;

        write_bool(write, self.open_descriptor.is_some())?;
        if let Some((version, descriptor)) = &self.open_descriptor {
            version.write(write)?;
            descriptor.write(write)?;
        }

        if self.kind == LinkedFileKind::External {
            let (descriptor_version, descriptor) = self.linked_descriptor.as_ref()
                .ok_or_else(|| Error::invalid("external linked file without descriptor"))?;

            descriptor_version.write(write)?;
            descriptor.write(write)?;

            if self.version > 3 {
                let date = self.modified.ok_or_else(|| Error::invalid("external linked file without date"))?;
                date.year.write(write)?;
                u8::write_slice(write, &[ date.month, date.day, date.hour, date.minute ])?;
                date.seconds.write(write)?;
            }

            self.external_file_size.write(write)?;
        }

        match self.kind {
            LinkedFileKind::Alias => u8::write_slice(write, &[ 0; 8 ])?,
            LinkedFileKind::Data => u8::write_slice(write, &self.data)?,
            LinkedFileKind::External => {},
        }

        if self.version >= 5 {
            write_unicode_string(write, self.child_document_id.as_deref().unwrap_or(""))?;
        }

        if self.version >= 6 {
            self.asset_modification_time.unwrap_or(0.0).write(write)?;
        }

        if self.version >= 7 {
            write_bool(write, self.asset_locked.unwrap_or(false))?;
        }

        if self.kind == LinkedFileKind::External && self.version == 2 {
            u8::write_slice(write, &self.data)?;
        }

        write_padding(write, start, 4)
    }
}

fn read_linked_files<R: Read + Seek>(read: &mut Tracking<R>, end: usize) -> Result<Vec<LinkedFile>> {
    let mut files = Vec::new();

    while read.byte_position() + 8 < end {
        let size = u64_to_usize(u64::read(read)?, "linked file entry size")?;
        let start = read.byte_position();

        if size > end.saturating_sub(start) {
            return Err(Error::invalid("linked file entry exceeds its block"));
        }

        files.push(LinkedFile::read(read, start + size)?);

        if read.byte_position() > start + size {
            return Err(Error::invalid("linked file entry read past its end"));
        }

        read.seek_read_to((start + round_up(size, 4)).min(end))?;
    }

    Ok(files)
}


impl LayerInfo {

    /// Usually `8BIM`.
    pub fn signature(&self) -> FourCc {
        match self {
            LayerInfo::Raw { signature, .. } => *signature,
            _ => FourCc(*b"8BIM"),
        }
    }

    /// The four-character key that identifies the kind of block.
    pub fn key(&self) -> FourCc {
        match self {
            LayerInfo::InfoLayers { key }
                | LayerInfo::LinkedFiles { key, .. }
                | LayerInfo::Raw { key, .. } => *key,

            LayerInfo::Section(section) => section.key,
            LayerInfo::UnicodeName(_) => FourCc(*b"luni"),
            LayerInfo::TypeTool(_) => FourCc(*b"TySh"),
            LayerInfo::Placed(_) => FourCc(*b"SoLd"),
            LayerInfo::LayerId(_) => FourCc(*b"lyid"),
        }
    }

    /// Read one block, including its padding if global.
    pub fn read<R: Read + Seek>(
        read: &mut Tracking<R>, global: bool, large_document: bool,
        context: &Context<'_>, nested: &mut NestedLayers<'_, R>,
    ) -> Result<Self>
    {
        let signature = FourCc::read(read)?;
        if signature != *b"8BIM" && signature != *b"8B64" {
            return Err(Error::invalid("layer info signature, must be 8BIM or 8B64"));
        }

        let key = FourCc::read(read)?;
        context.begin(read.byte_position(), format_args!("LayerInfo, {}", key));

        let length = if has_long_length(signature, key, large_document) {
            i64_to_usize(i64::read(read)?, "negative layer info length")?
        } else {
            i32_to_usize(i32::read(read)?, "negative layer info length")?
        };

        let start = read.byte_position();
        let end = start.checked_add(length).ok_or_else(|| Error::invalid("layer info length"))?;

        let info = match &key.0 {
            b"Layr" | b"Lr16" | b"Lr32" => {
                nested(read, end)?;
                LayerInfo::InfoLayers { key }
            },

            b"lsct" | b"lsdk" => LayerInfo::Section(SectionInfo::read(read, key, length)?),
            b"luni" => LayerInfo::UnicodeName(read_unicode_string(read)?),
            b"TySh" => LayerInfo::TypeTool(TypeToolInfo::read(read, end)?),
            b"SoLd" => LayerInfo::Placed(PlacedLayer::read(read)?),
            b"lyid" => LayerInfo::LayerId(i32::read(read)?),
            b"lnkD" | b"lnkE" | b"lnk2" | b"lnk3" => LayerInfo::LinkedFiles { key, files: read_linked_files(read, end)? },

            _ => LayerInfo::Raw {
                signature, key,
                data: u8::read_vec(read, length, SOFT_MAX_ALLOCATION, Some(MAX_BYTE_ARRAY_LENGTH))?,
            },
        };

        if read.byte_position() > end {
            return Err(Error::invalid(format!("layer info {} read past its end", key)));
        }

        // the declared length may omit unknown trailing fields
        read.seek_read_to(end)?;

        if global {
            skip_padding(read, start, 4)?;
        }

        context.end(read.byte_position(), format_args!("LayerInfo, {}, {}", signature, key));
        Ok(info)
    }

    /// Read blocks while at least 12 bytes remain before `end`, then move to `end`.
    pub fn read_all<R: Read + Seek>(
        read: &mut Tracking<R>, end: usize, global: bool, large_document: bool,
        context: &Context<'_>, nested: &mut NestedLayers<'_, R>,
    ) -> Result<Vec<Self>>
    {
        let mut infos = Vec::new();

        while end.saturating_sub(read.byte_position()) >= 12 {
            infos.push(LayerInfo::read(read, global, large_document, context, nested)?);
        }

        // up to three bytes of padding may follow the last block
        let position = read.byte_position();
        if position <= end && end - position < 4 { read.seek_read_to(end)?; }
        else { context.finish_block(read, end, "additional layer info")?; }

        Ok(infos)
    }

    /// Write the block with a back-patched length, padded to 4 if global.
    pub fn write<W: Write + Seek>(
        &self, write: &mut Tracking<W>, global: bool, large_document: bool,
        context: &Context<'_>, nested: &mut NestedLayers<'_, W>,
    ) -> UnitResult
    {
        let (signature, key) = (self.signature(), self.key());
        context.begin(write.byte_position(), format_args!("LayerInfo, {}, {}", signature, key));

        signature.write(write)?;
        key.write(write)?;

        let start = write.byte_position();
        write_length_block(write, has_long_length(signature, key, large_document), |write| {
            match self {
                LayerInfo::InfoLayers { .. } => nested(write, 0),
                LayerInfo::Section(section) => section.write(write),
                LayerInfo::TypeTool(info) => info.write(write),
                LayerInfo::Placed(placed) => placed.write(write),
                LayerInfo::LayerId(id) => id.write(write),
                LayerInfo::Raw { data, .. } => u8::write_slice(write, data),

                LayerInfo::UnicodeName(name) => {
                    let name_start = write.byte_position();
                    write_unicode_string(write, name)?;
                    write_padding(write, name_start, 4)
                },

                LayerInfo::LinkedFiles { files, .. } => {
                    for file in files {
                        write_length_block(write, true, |write| file.write(write))?;
                    }

                    Ok(())
                },
            }
        })?;

        if global {
            write_padding(write, start, 4)?;
        }

        context.end(write.byte_position(), format_args!("LayerInfo, {}, {}", signature, key));
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    type Stream = Cursor<Vec<u8>>;

    fn no_nested() -> impl FnMut(&mut Tracking<Stream>, usize) -> UnitResult {
        |_, _| Err(Error::invalid("unexpected nested layers"))
    }

    fn round_trip(infos: &[LayerInfo], global: bool, large: bool) -> (Vec<u8>, Vec<LayerInfo>) {
        let context = Context::default();
        let mut write = Tracking::new(Cursor::new(Vec::new()));

        for info in infos {
            info.write(&mut write, global, large, &context, &mut no_nested()).unwrap();
        }

        let bytes = write.into_inner().into_inner();
        let end = bytes.len();

        let mut read = Tracking::new(Cursor::new(bytes.clone()));
        let read_infos = LayerInfo::read_all(&mut read, end, global, large, &context, &mut no_nested()).unwrap();
        (bytes, read_infos)
    }

    #[test]
    fn long_length_table(){
        let bim = FourCc(*b"8BIM");
        assert!(has_long_length(bim, FourCc(*b"Lr16"), true));
        assert!(has_long_length(bim, FourCc(*b"PxSD"), true));
        assert!(!has_long_length(bim, FourCc(*b"Lr16"), false));
        assert!(!has_long_length(bim, FourCc(*b"luni"), true));
        assert!(has_long_length(FourCc(*b"8B64"), FourCc(*b"luni"), false));
    }

    #[test]
    fn decoded_blocks_survive(){
        let mut placed = Descriptor::new("", "null");
        placed.insert("Idnt", Element::Text("abc-123\0".into()));
        placed.insert("Trnf", Element::List(
            [ 10.0, 20.0, 110.0, 20.0, 110.0, 70.0, 10.0, 70.0 ].iter().map(|&v| Element::Double(v)).collect()
        ));

        let infos = vec![
            LayerInfo::Section(SectionInfo::new(SectionKind::ClosedFolder, FourCc(*b"pass"))),
            LayerInfo::UnicodeName("Ebene 1".into()),
            LayerInfo::LayerId(42),
            LayerInfo::Placed(PlacedLayer { kind: FourCc(*b"soLD"), version: 4, descriptor_version: 16, descriptor: placed }),
            LayerInfo::Raw { signature: FourCc(*b"8BIM"), key: FourCc(*b"clbl"), data: vec![ 1, 0, 0, 0 ] },
        ];

        for &(global, large) in &[ (false, false), (true, true) ] {
            let (_, read) = round_trip(&infos, global, large);
            assert_eq!(read, infos);
        }

        match &infos[3] {
            LayerInfo::Placed(placed) => {
                assert_eq!(placed.unique_id().as_deref(), Some("abc-123"));
                assert!(placed.transform().is_some());
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn unicode_name_is_padded_to_four(){
        let (bytes, _) = round_trip(&[ LayerInfo::UnicodeName("a".into()) ], false, false);
        // signature, key, length, then 4 + 2 bytes of string padded to 8
        assert_eq!(bytes.len(), 4 + 4 + 4 + 8);
        assert_eq!(&bytes[8 .. 12], &[ 0, 0, 0, 8 ]);
    }

    #[test]
    fn global_blocks_are_padded_to_four(){
        let info = LayerInfo::Raw { signature: FourCc(*b"8BIM"), key: FourCc(*b"Patt"), data: vec![ 1, 2, 3 ] };
        let (bytes, read) = round_trip(&[ info.clone(), info.clone() ], true, false);
        assert_eq!(bytes.len(), 2 * (12 + 4));
        assert_eq!(read, vec![ info.clone(), info ]);
    }

    #[test]
    fn section_without_blend_mode(){
        let mut bytes = Vec::new();
        u8::write_slice(&mut bytes, b"8BIMlsct").unwrap();
        4_i32.write(&mut bytes).unwrap();
        3_i32.write(&mut bytes).unwrap();

        let mut read = Tracking::new(Cursor::new(bytes.clone()));
        let info = LayerInfo::read(&mut read, false, false, &Context::default(), &mut no_nested()).unwrap();
        assert_eq!(info, LayerInfo::Section(SectionInfo { key: FourCc(*b"lsct"), kind: SectionKind::Divider, blend_mode: None, subtype: None }));
    }

    #[test]
    fn bad_signature_is_invalid(){
        let mut bytes = b"8BXMluni".to_vec();
        bytes.extend_from_slice(&[ 0; 8 ]);
        let mut read = Tracking::new(Cursor::new(bytes));
        assert!(LayerInfo::read(&mut read, false, false, &Context::default(), &mut no_nested()).is_err());
    }

    #[test]
    fn embedded_linked_file(){
        let files = vec![
            LinkedFile::embedded("id-1", "Sprite.psb", b"8BPS not really".to_vec()),
            LinkedFile::embedded("id-2", "Other.png", vec![ 7; 5 ]),
        ];

        let info = LayerInfo::LinkedFiles { key: FourCc(*b"lnk2"), files };

        for &large in &[ false, true ] {
            let (_, read) = round_trip(&[ info.clone() ], true, large);
            assert_eq!(read, vec![ info.clone() ]);
        }

        if let LayerInfo::LinkedFiles { files, .. } = &info {
            assert_eq!(files[0].name_without_extension(), "Sprite");
            assert!(files[0].is_embedded_document());
            assert!(!files[1].is_embedded_document());
        }
    }

    fn external_file(version: i32, data: Vec<u8>) -> LinkedFile {
        let mut linked_descriptor = Descriptor::new("", "ExternalFileLink");
        linked_descriptor.insert("relPath", Element::Text("images/logo.png".into()));

        LinkedFile {
            kind: LinkedFileKind::External,
            version,
            linked_descriptor: Some((16, linked_descriptor)),
            external_file_size: data.len() as u64,
            open_descriptor: None,
            data,
            child_document_id: None,
            asset_modification_time: None,
            asset_locked: None,
            .. LinkedFile::embedded("external", "logo.png", Vec::new())
        }
    }

    fn linked_files_round_trip(files: Vec<LinkedFile>) {
        let info = LayerInfo::LinkedFiles { key: FourCc(*b"lnk2"), files };

        for &large in &[ false, true ] {
            let (_, read) = round_trip(&[ info.clone() ], true, large);
            assert_eq!(read, vec![ info.clone() ]);
        }
    }

    #[test]
    fn external_linked_files_without_date(){
        // a descriptor version above 3 does not imply a date
        let with_file_contents = external_file(2, vec![ 1, 2, 3, 4, 5 ]);
        let without_date = external_file(3, Vec::new());

        linked_files_round_trip(vec![ with_file_contents, without_date ]);
    }

    #[test]
    fn external_linked_file_with_date(){
        let mut file = external_file(7, Vec::new());
        file.external_file_size = 2048;
        file.modified = Some(LinkedFileDate { year: 2019, month: 4, day: 30, hour: 13, minute: 7, seconds: 12.5 });
        file.child_document_id = Some("child".into());
        file.asset_modification_time = Some(1.5);
        file.asset_locked = Some(true);

        linked_files_round_trip(vec![ file ]);

        let mut undated = external_file(4, Vec::new());
        undated.modified = None;

        let info = LayerInfo::LinkedFiles { key: FourCc(*b"lnk2"), files: vec![ undated ] };
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        assert!(info.write(&mut write, true, false, &Context::default(), &mut no_nested()).is_err());
    }

    #[test]
    fn alias_linked_file(){
        let alias = LinkedFile {
            kind: LinkedFileKind::Alias,
            version: 2,
            open_descriptor: None,
            child_document_id: None,
            asset_modification_time: None,
            asset_locked: None,
            .. LinkedFile::embedded("alias", "elsewhere.psd", Vec::new())
        };

        linked_files_round_trip(vec![ alias.clone(), external_file(3, Vec::new()) ]);

        // eight alias bytes follow the header of the entry
        let info = LayerInfo::LinkedFiles { key: FourCc(*b"lnk2"), files: vec![ alias ] };
        let (bytes, _) = round_trip(&[ info ], true, false);
        assert!(bytes.ends_with(&[ 0; 8 ]));
    }

    #[test]
    fn type_tool_engine_data(){
        let engine_data = EngineData::Dictionary(vec![
            ("EngineDict".into(), EngineData::Dictionary(vec![
                ("Editor".into(), EngineData::Dictionary(vec![ ("Text".into(), EngineData::Text("Hello\r".into())) ])),
            ])),
        ]);

        let mut text = Descriptor::new("", "TxLr");
        text.insert("Txt ", Element::Text("Hello\r".into()));
        text.insert("EngineData", Element::RawData(Vec::new()));

        let info = TypeToolInfo::new(
            TextTransform { xx: 1.0, yy: 1.0, tx: 5.0, ty: 7.0, .. TextTransform::default() },
            text, Descriptor::new("", "warp"), Some(engine_data)
        );

        let (_, read) = round_trip(&[ LayerInfo::TypeTool(info.clone()) ], false, false);

        match &read[0] {
            LayerInfo::TypeTool(read) => {
                assert_eq!(read.text_string(), Some("Hello\r"));
                assert_eq!(read.engine_data, info.engine_data);
                assert_eq!(read.trailing, vec![ 0; 4 ]);
                assert_eq!(read.transform, info.transform);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nested_layers_are_delegated(){
        let mut nested_calls = 0;
        let info = LayerInfo::InfoLayers { key: FourCc(*b"Lr16") };

        let context = Context::default();
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        info.write(&mut write, true, false, &context, &mut |write: &mut Tracking<Stream>, _| {
            nested_calls += 1;
            u8::write_slice(write, &[ 1, 2, 3, 4 ])
        }).unwrap();

        let bytes = write.into_inner().into_inner();
        let mut read = Tracking::new(Cursor::new(bytes));
        let read_info = LayerInfo::read(&mut read, true, false, &context, &mut |read: &mut Tracking<Stream>, end| {
            nested_calls += 1;
            assert_eq!(end - read.byte_position(), 4);
            skip_bytes(read, 4).map_err(Error::from)
        }).unwrap();

        assert_eq!(read_info, info);
        assert_eq!(nested_calls, 2);
    }
}
