
//! Photoshop action descriptors: a recursive, type-tagged key-value format.
//! Used by type tool data, placed layers and linked files.

use crate::io::*;
use crate::error::{Result, UnitResult, Error, usize_to_i32, i32_to_usize};


/// Nesting deeper than this is rejected instead of exhausting the stack.
const MAX_NESTING: usize = 128;


/// A named class and its ordered items.
/// Keys are unique; inserting an existing key replaces the element in place.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Descriptor {
    pub class_id_name: String,
    pub class_id: String,
    pub items: Vec<(String, Element)>,
}

/// A class name together with its id.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Class {
    pub name: String,
    pub class_id: String,
}

/// A single value in a descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    /// `obj `
    Reference(Vec<ReferenceItem>),

    /// `Objc`
    Descriptor(Descriptor),

    /// `VlLs`
    List(Vec<Element>),

    /// `doub`
    Double(f64),

    /// `UntF`, such as `#Pxl` or `#Ang`.
    UnitFloat { unit: FourCc, value: f64 },

    /// `TEXT`
    Text(String),

    /// `enum`
    Enumerated { type_id: String, value: String },

    /// `long`
    Integer(i32),

    /// `comp`
    Long(i64),

    /// `bool`
    Bool(bool),

    /// `GlbO`
    GlobalObject(Descriptor),

    /// `type`
    Class(Class),

    /// `GlbC`
    GlobalClass(Class),

    /// `alis`
    Alias(Vec<u8>),

    /// `tdta`
    RawData(Vec<u8>),

    /// `ObAr`
    ObjectArray(ObjectArray),
}

/// One item of a reference element.
#[derive(Clone, Debug, PartialEq)]
pub enum ReferenceItem {
    /// `prop`
    Property { class: Class, key_id: String },

    /// `Clss`
    Class(Class),

    /// `Enmr`
    Enumerated { class: Class, type_id: String, value: String },

    /// `rele`
    Offset { class: Class, value: i32 },

    /// `Idnt`
    Identifier(i32),

    /// `indx`
    Index(i32),

    /// `name`
    Name { class: Class, name: String },
}

/// An array of unit float lists, as found in warp and transform data.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ObjectArray {
    pub version: i32,
    pub name: String,
    pub class_id: String,
    pub items: Vec<ObjectArrayItem>,
}

/// One named list of doubles inside an object array.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectArrayItem {
    /// Usually `Hrzn` or `Vrtc`.
    pub key: String,

    /// Usually `UnFl`.
    pub kind: FourCc,

    /// Usually `#Pxl`.
    pub units: FourCc,

    pub values: Vec<f64>,
}


mod tag {
    pub const REFERENCE: [u8; 4] = *b"obj ";
    pub const DESCRIPTOR: [u8; 4] = *b"Objc";
    pub const LIST: [u8; 4] = *b"VlLs";
    pub const DOUBLE: [u8; 4] = *b"doub";
    pub const UNIT_FLOAT: [u8; 4] = *b"UntF";
    pub const TEXT: [u8; 4] = *b"TEXT";
    pub const ENUMERATED: [u8; 4] = *b"enum";
    pub const INTEGER: [u8; 4] = *b"long";
    pub const LONG: [u8; 4] = *b"comp";
    pub const BOOL: [u8; 4] = *b"bool";
    pub const GLOBAL_OBJECT: [u8; 4] = *b"GlbO";
    pub const CLASS: [u8; 4] = *b"type";
    pub const GLOBAL_CLASS: [u8; 4] = *b"GlbC";
    pub const ALIAS: [u8; 4] = *b"alis";
    pub const RAW_DATA: [u8; 4] = *b"tdta";
    pub const OBJECT_ARRAY: [u8; 4] = *b"ObAr";

    pub const PROPERTY: [u8; 4] = *b"prop";
    pub const CLASS_REFERENCE: [u8; 4] = *b"Clss";
    pub const ENUMERATED_REFERENCE: [u8; 4] = *b"Enmr";
    pub const OFFSET: [u8; 4] = *b"rele";
    pub const IDENTIFIER: [u8; 4] = *b"Idnt";
    pub const INDEX: [u8; 4] = *b"indx";
    pub const NAME: [u8; 4] = *b"name";
}


impl Descriptor {

    /// Create an empty descriptor of the specified class.
    pub fn new(class_id_name: impl Into<String>, class_id: impl Into<String>) -> Self {
        Descriptor { class_id_name: class_id_name.into(), class_id: class_id.into(), items: Vec::new() }
    }

    /// Look up an element by key.
    pub fn get(&self, key: &str) -> Option<&Element> {
        self.items.iter().find(|(item_key, _)| item_key == key).map(|(_, element)| element)
    }

    /// Look up an element by key, for modification.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Element> {
        self.items.iter_mut().find(|(item_key, _)| item_key == key).map(|(_, element)| element)
    }

    /// Replace the element with that key, or append it.
    pub fn insert(&mut self, key: impl Into<String>, element: Element) {
        let key = key.into();

        match self.get_mut(&key) {
            Some(existing) => *existing = element,
            None => self.items.push((key, element)),
        }
    }

    /// Look up a nested descriptor by key.
    pub fn get_descriptor(&self, key: &str) -> Option<&Descriptor> {
        match self.get(key)? {
            Element::Descriptor(descriptor) | Element::GlobalObject(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Look up text by key.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Element::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Look up a number by key, accepting doubles, unit floats and integers.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    /// Read the class, then all key-element pairs.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Self::read_nested(read, 0)
    }

    fn read_nested(read: &mut impl Read, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(Error::invalid("descriptor nesting too deep"));
        }

        let class_id_name = read_unicode_string(read)?;
        let class_id = read_key(read)?;
        let count = i32_to_usize(i32::read(read)?, "negative descriptor item count")?;

        let mut descriptor = Descriptor { class_id_name, class_id, items: Vec::with_capacity(count.min(256)) };

        for _ in 0 .. count {
            let key = read_key(read)?;
            let element = Element::read_nested(read, depth + 1)?;
            descriptor.insert(key, element);
        }

        Ok(descriptor)
    }

    /// Write the class, then all key-element pairs.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        write_unicode_string(write, &self.class_id_name)?;
        write_key(write, &self.class_id)?;
        usize_to_i32(self.items.len(), "too many descriptor items")?.write(write)?;

        for (key, element) in &self.items {
            write_key(write, key)?;
            element.write(write)?;
        }

        Ok(())
    }
}


impl Class {
    fn read(read: &mut impl Read) -> Result<Self> {
        let name = read_unicode_string(read)?;
        let class_id = read_key(read)?;
        Ok(Class { name, class_id })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        write_unicode_string(write, &self.name)?;
        write_key(write, &self.class_id)
    }
}


impl Element {

    /// The four-character tag that precedes this element.
    pub fn tag(&self) -> FourCc {
        FourCc(match self {
            Element::Reference(_) => tag::REFERENCE,
            Element::Descriptor(_) => tag::DESCRIPTOR,
            Element::List(_) => tag::LIST,
            Element::Double(_) => tag::DOUBLE,
            Element::UnitFloat { .. } => tag::UNIT_FLOAT,
            Element::Text(_) => tag::TEXT,
            Element::Enumerated { .. } => tag::ENUMERATED,
            Element::Integer(_) => tag::INTEGER,
            Element::Long(_) => tag::LONG,
            Element::Bool(_) => tag::BOOL,
            Element::GlobalObject(_) => tag::GLOBAL_OBJECT,
            Element::Class(_) => tag::CLASS,
            Element::GlobalClass(_) => tag::GLOBAL_CLASS,
            Element::Alias(_) => tag::ALIAS,
            Element::RawData(_) => tag::RAW_DATA,
            Element::ObjectArray(_) => tag::OBJECT_ARRAY,
        })
    }

    /// The numeric value of doubles, unit floats and integers.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Element::Double(value) => Some(value),
            Element::UnitFloat { value, .. } => Some(value),
            Element::Integer(value) => Some(value as f64),
            Element::Long(value) => Some(value as f64),
            _ => None,
        }
    }

    /// Read the tag, then the tag-specific body.
    /// Unknown tags are an error, as their length cannot be known.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        Self::read_nested(read, 0)
    }

    fn read_nested(read: &mut impl Read, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(Error::invalid("descriptor nesting too deep"));
        }

        let tag = FourCc::read(read)?;

        Ok(match tag.0 {
            tag::REFERENCE => {
                let count = i32_to_usize(i32::read(read)?, "negative reference count")?;
                let mut items = Vec::with_capacity(count.min(64));
                for _ in 0 .. count { items.push(ReferenceItem::read(read)?); }
                Element::Reference(items)
            },

            tag::DESCRIPTOR => Element::Descriptor(Descriptor::read_nested(read, depth + 1)?),
            tag::GLOBAL_OBJECT => Element::GlobalObject(Descriptor::read_nested(read, depth + 1)?),

            tag::LIST => {
                let count = i32_to_usize(i32::read(read)?, "negative list length")?;
                let mut elements = Vec::with_capacity(count.min(256));
                for _ in 0 .. count { elements.push(Element::read_nested(read, depth + 1)?); }
                Element::List(elements)
            },

            tag::DOUBLE => Element::Double(f64::read(read)?),

            tag::UNIT_FLOAT => {
                let unit = FourCc::read(read)?;
                let value = f64::read(read)?;
                Element::UnitFloat { unit, value }
            },

            tag::TEXT => Element::Text(read_unicode_string(read)?),

            tag::ENUMERATED => {
                let type_id = read_key(read)?;
                let value = read_key(read)?;
                Element::Enumerated { type_id, value }
            },

            tag::INTEGER => Element::Integer(i32::read(read)?),
            tag::LONG => Element::Long(i64::read(read)?),
            tag::BOOL => Element::Bool(read_bool(read)?),
            tag::CLASS => Element::Class(Class::read(read)?),
            tag::GLOBAL_CLASS => Element::GlobalClass(Class::read(read)?),
            tag::ALIAS => Element::Alias(read_i32_sized_bytes(read)?),
            tag::RAW_DATA => Element::RawData(read_i32_sized_bytes(read)?),
            tag::OBJECT_ARRAY => Element::ObjectArray(ObjectArray::read(read)?),

            _ => return Err(Error::invalid(format!("unknown descriptor element type {:?}", tag))),
        })
    }

    /// Write the tag, then the tag-specific body.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.tag().write(write)?;

        match self {
            Element::Reference(items) => {
                usize_to_i32(items.len(), "too many reference items")?.write(write)?;
                for item in items { item.write(write)?; }
            },

            Element::Descriptor(descriptor) | Element::GlobalObject(descriptor) => descriptor.write(write)?,

            Element::List(elements) => {
                usize_to_i32(elements.len(), "list too long")?.write(write)?;
                for element in elements { element.write(write)?; }
            },

            Element::Double(value) => value.write(write)?,

            Element::UnitFloat { unit, value } => {
                unit.write(write)?;
                value.write(write)?;
            },

            Element::Text(text) => write_unicode_string(write, text)?,

            Element::Enumerated { type_id, value } => {
                write_key(write, type_id)?;
                write_key(write, value)?;
            },

            Element::Integer(value) => value.write(write)?,
            Element::Long(value) => value.write(write)?,
            Element::Bool(value) => write_bool(write, *value)?,
            Element::Class(class) | Element::GlobalClass(class) => class.write(write)?,
            Element::Alias(bytes) | Element::RawData(bytes) => write_i32_sized_bytes(write, bytes)?,
            Element::ObjectArray(array) => array.write(write)?,
        }

        Ok(())
    }
}


impl ReferenceItem {

    fn read(read: &mut impl Read) -> Result<Self> {
        let tag = FourCc::read(read)?;

        Ok(match tag.0 {
            tag::PROPERTY => {
                let class = Class::read(read)?;
                let key_id = read_key(read)?;
                ReferenceItem::Property { class, key_id }
            },

            tag::CLASS_REFERENCE => ReferenceItem::Class(Class::read(read)?),

            tag::ENUMERATED_REFERENCE => {
                let class = Class::read(read)?;
                let type_id = read_key(read)?;
                let value = read_key(read)?;
                ReferenceItem::Enumerated { class, type_id, value }
            },

            tag::OFFSET => {
                let class = Class::read(read)?;
                let value = i32::read(read)?;
                ReferenceItem::Offset { class, value }
            },

            tag::IDENTIFIER => ReferenceItem::Identifier(i32::read(read)?),
            tag::INDEX => ReferenceItem::Index(i32::read(read)?),

            tag::NAME => {
                let class = Class::read(read)?;
                let name = read_unicode_string(read)?;
                ReferenceItem::Name { class, name }
            },

            _ => return Err(Error::invalid(format!("unknown reference element type {:?}", tag))),
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        match self {
            ReferenceItem::Property { class, key_id } => {
                FourCc(tag::PROPERTY).write(write)?;
                class.write(write)?;
                write_key(write, key_id)
            },

            ReferenceItem::Class(class) => {
                FourCc(tag::CLASS_REFERENCE).write(write)?;
                class.write(write)
            },

            ReferenceItem::Enumerated { class, type_id, value } => {
                FourCc(tag::ENUMERATED_REFERENCE).write(write)?;
                class.write(write)?;
                write_key(write, type_id)?;
                write_key(write, value)
            },

            ReferenceItem::Offset { class, value } => {
                FourCc(tag::OFFSET).write(write)?;
                class.write(write)?;
                value.write(write)
            },

            ReferenceItem::Identifier(value) => {
                FourCc(tag::IDENTIFIER).write(write)?;
                value.write(write)
            },

            ReferenceItem::Index(value) => {
                FourCc(tag::INDEX).write(write)?;
                value.write(write)
            },

            ReferenceItem::Name { class, name } => {
                FourCc(tag::NAME).write(write)?;
                class.write(write)?;
                write_unicode_string(write, name)
            },
        }
    }
}


impl ObjectArray {
    fn read(read: &mut impl Read) -> Result<Self> {
        let version = i32::read(read)?;
        let name = read_unicode_string(read)?;
        let class_id = read_key(read)?;
        let count = i32_to_usize(i32::read(read)?, "negative object array length")?;

        let mut items = Vec::with_capacity(count.min(64));
        for _ in 0 .. count {
            let key = read_key(read)?;
            let kind = FourCc::read(read)?;
            let units = FourCc::read(read)?;
            let value_count = i32_to_usize(i32::read(read)?, "negative object array item length")?;
            let values = f64::read_vec(read, value_count, SOFT_MAX_ALLOCATION, None)?;
            items.push(ObjectArrayItem { key, kind, units, values });
        }

        Ok(ObjectArray { version, name, class_id, items })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        self.version.write(write)?;
        write_unicode_string(write, &self.name)?;
        write_key(write, &self.class_id)?;
        usize_to_i32(self.items.len(), "object array too long")?.write(write)?;

        for item in &self.items {
            write_key(write, &item.key)?;
            item.kind.write(write)?;
            item.units.write(write)?;
            usize_to_i32(item.values.len(), "object array item too long")?.write(write)?;
            f64::write_slice(write, &item.values)?;
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Descriptor {
        let mut bounds = Descriptor::new("", "bounds");
        bounds.insert("Left", Element::UnitFloat { unit: FourCc(*b"#Pnt"), value: -3.5 });
        bounds.insert("Top ", Element::UnitFloat { unit: FourCc(*b"#Pnt"), value: 1.0 });

        let mut descriptor = Descriptor::new("Text", "TxLr");
        descriptor.insert("Txt ", Element::Text("hello".to_string()));
        descriptor.insert("bounds", Element::Descriptor(bounds));
        descriptor.insert("Ornt", Element::Enumerated { type_id: "Ornt".into(), value: "Hrzn".into() });
        descriptor.insert("AntA", Element::Bool(true));
        descriptor.insert("size", Element::Long(1 << 40));
        descriptor.insert("list", Element::List(vec![ Element::Integer(4), Element::Double(0.25) ]));
        descriptor.insert("EngineData", Element::RawData(vec![ 1, 2, 3 ]));
        descriptor.insert("null", Element::Reference(vec![
            ReferenceItem::Property { class: Class { name: "".into(), class_id: "Lyr ".into() }, key_id: "Nm  ".into() },
            ReferenceItem::Enumerated { class: Class::default(), type_id: "Ordn".into(), value: "Trgt".into() },
            ReferenceItem::Index(3),
        ]));
        descriptor.insert("warp", Element::ObjectArray(ObjectArray {
            version: 16, name: "".into(), class_id: "rationalPoint".into(),
            items: vec![ ObjectArrayItem { key: "Hrzn".into(), kind: FourCc(*b"UntF"), units: FourCc(*b"#Pxl"), values: vec![ 0.0, 10.5 ] } ],
        }));

        descriptor
    }

    #[test]
    fn preserves_structure_and_order(){
        let descriptor = sample();
        let mut bytes = Vec::new();
        descriptor.write(&mut bytes).unwrap();

        let read = Descriptor::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, descriptor);
        assert_eq!(read.items[0].0, "Txt ");
        assert_eq!(read.get_text("Txt "), Some("hello"));
        assert_eq!(read.get_descriptor("bounds").unwrap().get_number("Left"), Some(-3.5));
    }

    #[test]
    fn insert_replaces_existing_key(){
        let mut descriptor = Descriptor::new("", "null");
        descriptor.insert("a", Element::Integer(1));
        descriptor.insert("b", Element::Integer(2));
        descriptor.insert("a", Element::Integer(3));

        assert_eq!(descriptor.items.len(), 2);
        assert_eq!(descriptor.items[0], ("a".to_string(), Element::Integer(3)));
    }

    #[test]
    fn unknown_element_tag_is_invalid(){
        let mut bytes = Vec::new();
        write_unicode_string(&mut bytes, "").unwrap();
        write_key(&mut bytes, "null").unwrap();
        1_i32.write(&mut bytes).unwrap();
        write_key(&mut bytes, "what").unwrap();
        u8::write_slice(&mut bytes, b"XXXX").unwrap();

        assert!(matches!(Descriptor::read(&mut bytes.as_slice()), Err(Error::Invalid(_))));
    }

    #[test]
    fn unknown_reference_tag_is_invalid(){
        let mut bytes = Vec::new();
        u8::write_slice(&mut bytes, b"obj ").unwrap();
        1_i32.write(&mut bytes).unwrap();
        u8::write_slice(&mut bytes, b"????").unwrap();

        assert!(matches!(Element::read(&mut bytes.as_slice()), Err(Error::Invalid(_))));
    }

    #[test]
    fn bool_is_one_byte(){
        let mut bytes = Vec::new();
        Element::Bool(true).write(&mut bytes).unwrap();
        assert_eq!(bytes, b"bool\x01");
    }
}
