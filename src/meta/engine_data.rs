
//! The text-like serialization that type layers use for their rich text.
//! Dictionaries are enclosed in `<<` and `>>`, with `/Key` properties,
//! lists are enclosed in brackets, and strings are big-endian utf-16
//! enclosed in parentheses.
//!
//! The writer reproduces the exact layout Photoshop produces,
//! because the bytes are embedded into the type tool data again.

use crate::error::{Result, Error};


const LINE_FEED: u8 = b'\n';
const TAB: u8 = b'\t';
const SPACE: u8 = b' ';
const CARRIAGE_RETURN: u8 = b'\r';
const DICTIONARY_START: u8 = b'<';
const DICTIONARY_END: u8 = b'>';
const PROPERTY_START: u8 = b'/';
const TEXT_START: u8 = b'(';
const TEXT_END: u8 = b')';
const ESCAPE: u8 = b'\\';
const LIST_START: u8 = b'[';
const LIST_END: u8 = b']';
const BYTE_ORDER_MARK: [u8; 2] = [ 0xfe, 0xff ];

const MAX_NESTING: usize = 256;


/// A value in the engine data tree.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineData {

    /// Properties in file order. Keys are unique.
    Dictionary(Vec<(String, EngineData)>),

    List(Vec<EngineData>),
    Text(String),
    Bool(bool),
    Float(f32),
    Integer(i32),
}

impl EngineData {

    /// An empty dictionary.
    pub fn dictionary() -> Self { EngineData::Dictionary(Vec::new()) }

    /// The value of that key, if this is a dictionary that contains it.
    pub fn get(&self, key: &str) -> Option<&EngineData> {
        match self {
            EngineData::Dictionary(properties) => properties.iter()
                .find(|(property, _)| property == key).map(|(_, value)| value),

            _ => None,
        }
    }

    /// The value of that key, if this is a dictionary that contains it.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut EngineData> {
        match self {
            EngineData::Dictionary(properties) => properties.iter_mut()
                .find(|(property, _)| property == key).map(|(_, value)| value),

            _ => None,
        }
    }

    /// Follow a sequence of dictionary keys.
    pub fn get_path(&self, path: &[&str]) -> Option<&EngineData> {
        path.iter().try_fold(self, |value, key| value.get(key))
    }

    /// Replace the value of that key, or append it.
    /// Returns an error if this is not a dictionary.
    pub fn insert(&mut self, key: impl Into<String>, value: EngineData) -> Result<()> {
        let key = key.into();

        match self {
            EngineData::Dictionary(properties) => {
                match properties.iter_mut().find(|(property, _)| *property == key) {
                    Some((_, existing)) => *existing = value,
                    None => properties.push((key, value)),
                }

                Ok(())
            },

            _ => Err(Error::invalid("engine data property on a value that is not a dictionary")),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self { EngineData::Text(text) => Some(text), _ => None }
    }

    pub fn as_list(&self) -> Option<&[EngineData]> {
        match self { EngineData::List(list) => Some(list), _ => None }
    }

    fn is_scalar_number_or_bool(&self) -> bool {
        matches!(self, EngineData::Bool(_) | EngineData::Float(_) | EngineData::Integer(_))
    }

    /// Parse the root value.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        Parser { bytes, index: 0 }.value(0)
    }

    /// Serialize in the layout Photoshop uses.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![ LINE_FEED ];
        self.write_to(&mut bytes, 1);
        bytes
    }

    fn write_to(&self, bytes: &mut Vec<u8>, indent: usize) {
        match self {
            EngineData::Dictionary(properties) => {
                new_line(bytes, indent - 1);
                bytes.extend_from_slice(&[ DICTIONARY_START, DICTIONARY_START ]);

                for (key, value) in properties {
                    new_line(bytes, indent);
                    bytes.push(PROPERTY_START);
                    bytes.extend(key.chars().map(|character| character as u32 as u8));
                    value.write_to(bytes, indent + 1);
                }

                new_line(bytes, indent - 1);
                bytes.extend_from_slice(&[ DICTIONARY_END, DICTIONARY_END ]);
            },

            EngineData::List(items) => {
                bytes.push(SPACE);
                bytes.push(LIST_START);

                for item in items {
                    item.write_to(bytes, indent);
                }

                // scalar lists close inline, lists of objects close on a new line
                match items.first() {
                    None => bytes.push(SPACE),
                    Some(first) if first.is_scalar_number_or_bool() => bytes.push(SPACE),
                    Some(_) => new_line(bytes, indent),
                }

                bytes.push(LIST_END);
            },

            EngineData::Text(text) => {
                bytes.push(SPACE);
                bytes.push(TEXT_START);
                bytes.extend_from_slice(&BYTE_ORDER_MARK);

                for unit in text.encode_utf16() {
                    for byte in unit.to_be_bytes().iter().copied() {
                        if byte == TEXT_START || byte == TEXT_END || byte == ESCAPE {
                            bytes.push(ESCAPE);
                        }

                        bytes.push(byte);
                    }
                }

                bytes.push(TEXT_END);
            },

            EngineData::Bool(value) => {
                bytes.push(SPACE);
                bytes.extend_from_slice(if *value { b"true" } else { b"false" });
            },

            EngineData::Float(value) => {
                bytes.push(SPACE);
                bytes.extend_from_slice(format!("{:.8}", value).as_bytes());
            },

            EngineData::Integer(value) => {
                bytes.push(SPACE);
                bytes.extend_from_slice(value.to_string().as_bytes());
            },
        }
    }
}

fn new_line(bytes: &mut Vec<u8>, indent: usize) {
    bytes.push(LINE_FEED);
    bytes.extend(std::iter::repeat(TAB).take(indent));
}


struct Parser<'b> {
    bytes: &'b [u8],
    index: usize,
}

impl Parser<'_> {

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn next(&mut self) -> Result<u8> {
        let byte = self.peek(0).ok_or_else(|| Error::invalid("engine data ended unexpectedly"))?;
        self.index += 1;
        Ok(byte)
    }

    fn skip_whitespace(&mut self) {
        while let Some(LINE_FEED) | Some(TAB) | Some(SPACE) | Some(CARRIAGE_RETURN) = self.peek(0) {
            self.index += 1;
        }
    }

    fn is_pair(&self, byte: u8) -> bool {
        self.peek(0) == Some(byte) && self.peek(1) == Some(byte)
    }

    /// Bytes up to the next whitespace or delimiter.
    fn token(&mut self) -> Result<&str> {
        let start = self.index;

        while let Some(byte) = self.peek(0) {
            match byte {
                LINE_FEED | TAB | SPACE | CARRIAGE_RETURN
                    | LIST_START | LIST_END | DICTIONARY_START | DICTIONARY_END
                    | PROPERTY_START | TEXT_START => break,

                _ => self.index += 1,
            }
        }

        std::str::from_utf8(&self.bytes[start .. self.index])
            .map_err(|_| Error::invalid("engine data token is not ascii"))
    }

    fn value(&mut self, depth: usize) -> Result<EngineData> {
        if depth > MAX_NESTING {
            return Err(Error::invalid("engine data nesting too deep"));
        }

        self.skip_whitespace();

        if self.is_pair(DICTIONARY_START) {
            self.index += 2;
            let mut properties: Vec<(String, EngineData)> = Vec::new();
            self.skip_whitespace();

            while !self.is_pair(DICTIONARY_END) {
                if self.next()? != PROPERTY_START {
                    return Err(Error::invalid("engine data property expected"));
                }

                let key = self.token()?.to_string();
                let value = self.value(depth + 1)?;

                match properties.iter_mut().find(|(property, _)| *property == key) {
                    Some((_, existing)) => *existing = value,
                    None => properties.push((key, value)),
                }

                self.skip_whitespace();
            }

            self.index += 2;
            return Ok(EngineData::Dictionary(properties));
        }

        if self.peek(0) == Some(LIST_START) {
            self.index += 1;
            let mut items = Vec::new();
            self.skip_whitespace();

            while self.peek(0) != Some(LIST_END) {
                items.push(self.value(depth + 1)?);
                self.skip_whitespace();
            }

            self.index += 1;
            return Ok(EngineData::List(items));
        }

        if self.peek(0) == Some(TEXT_START) {
            self.index += 1;
            return self.text();
        }

        let token = self.token()?;

        match token {
            "" => Err(Error::invalid("engine data value expected")),
            "true" => Ok(EngineData::Bool(true)),
            "false" => Ok(EngineData::Bool(false)),

            number if number.contains('.') => number.parse::<f32>()
                .map(EngineData::Float)
                .map_err(|_| Error::invalid("engine data float")),

            number => number.parse::<i32>()
                .map(EngineData::Integer)
                .map_err(|_| Error::invalid("engine data integer")),
        }
    }

    /// Reads an escaped string after the opening parenthesis.
    fn text(&mut self) -> Result<EngineData> {
        let mut raw = Vec::new();

        loop {
            match self.next()? {
                TEXT_END => break,
                ESCAPE => raw.push(self.next()?),
                byte => raw.push(byte),
            }
        }

        let units = match raw.strip_prefix(&BYTE_ORDER_MARK[..]) {
            Some(units) => units,

            // without byte order mark, the string is plain ascii
            None => return Ok(EngineData::Text(raw.iter().map(|&byte| byte as char).collect())),
        };

        if units.len() % 2 != 0 {
            return Err(Error::invalid("engine data string has an odd byte count"));
        }

        let units = units.chunks_exact(2).map(|pair| u16::from_be_bytes([ pair[0], pair[1] ]));

        let text = std::char::decode_utf16(units)
            .map(|unit| unit.unwrap_or(std::char::REPLACEMENT_CHARACTER))
            .collect();

        Ok(EngineData::Text(text))
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn utf16_text(text: &str) -> Vec<u8> {
        let mut bytes = vec![ b'(', 0xfe, 0xff ];
        for unit in text.encode_utf16() { bytes.extend_from_slice(&unit.to_be_bytes()); }
        bytes.push(b')');
        bytes
    }

    #[test]
    fn parses_photoshop_layout(){
        let mut bytes = b"\n\n<<\n\t/EngineDict\n\t<<\n\t\t/Editor\n\t\t<<\n\t\t\t/Text ".to_vec();
        bytes.extend(utf16_text("Hi\r"));
        bytes.extend_from_slice(b"\n\t\t>>\n\t\t/Sizes [ 12.5 3 ]\n\t\t/On true\n\t>>\n>>");

        let data = EngineData::read(&bytes).unwrap();
        assert_eq!(data.get_path(&[ "EngineDict", "Editor", "Text" ]).and_then(EngineData::as_text), Some("Hi\r"));

        let sizes = data.get_path(&[ "EngineDict", "Sizes" ]).unwrap().as_list().unwrap();
        assert_eq!(sizes, &[ EngineData::Float(12.5), EngineData::Integer(3) ]);
        assert_eq!(data.get_path(&[ "EngineDict", "On" ]), Some(&EngineData::Bool(true)));
    }

    #[test]
    fn writes_photoshop_layout(){
        let data = EngineData::Dictionary(vec![
            ("A".into(), EngineData::Integer(1)),
            ("B".into(), EngineData::List(vec![ EngineData::Float(0.5) ])),
            ("C".into(), EngineData::List(vec![ EngineData::dictionary() ])),
            ("D".into(), EngineData::List(vec![])),
        ]);

        let expected = b"\n\n<<\n\t/A 1\n\t/B [ 0.50000000 ]\n\t/C [\n\t<<\n\t>>\n\t\t]\n\t/D [ ]\n>>";
        assert_eq!(data.to_bytes(), expected.to_vec());
        assert_eq!(EngineData::read(&data.to_bytes()).unwrap(), data);
    }

    #[test]
    fn parentheses_inside_text_are_escaped(){
        let data = EngineData::Dictionary(vec![ ("Text".into(), EngineData::Text("a)(\\b ä".into())) ]);
        assert_eq!(EngineData::read(&data.to_bytes()).unwrap(), data);
    }

    #[test]
    fn insert_replaces_existing(){
        let mut data = EngineData::dictionary();
        data.insert("KinsokuSet", EngineData::Integer(1)).unwrap();
        data.insert("KinsokuSet", EngineData::List(vec![])).unwrap();
        assert_eq!(data, EngineData::Dictionary(vec![ ("KinsokuSet".into(), EngineData::List(vec![])) ]));
        assert!(EngineData::Integer(3).insert("x", EngineData::Bool(false)).is_err());
    }

    #[test]
    fn truncated_data_is_invalid(){
        assert!(EngineData::read(b"<< /A 1").is_err());
        assert!(EngineData::read(b"<< /A (\xfe\xff\x00").is_err());
        assert!(EngineData::read(b"<< A 1 >>").is_err());
        assert!(EngineData::read(b"[ 1 2").is_err());
    }
}
