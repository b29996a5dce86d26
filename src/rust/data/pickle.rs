use std::collections::HashMap;

use ndarray::ArrayD;

use super::nested::NestedValue;
use super::numpy;

/// Nesting depth past which a document is treated as self-referencing.
const MAX_DEPTH: usize = 512;

mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const LONG: u8 = b'L';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const PERSID: u8 = b'P';
    pub const BINPERSID: u8 = b'Q';
    pub const REDUCE: u8 = b'R';
    pub const STRING: u8 = b'S';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const UNICODE: u8 = b'V';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const DICT: u8 = b'd';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const GET: u8 = b'g';
    pub const BINGET: u8 = b'h';
    pub const INST: u8 = b'i';
    pub const LONG_BINGET: u8 = b'j';
    pub const LIST: u8 = b'l';
    pub const EMPTY_LIST: u8 = b']';
    pub const OBJ: u8 = b'o';
    pub const PUT: u8 = b'p';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';
    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const EXT1: u8 = 0x82;
    pub const EXT2: u8 = 0x83;
    pub const EXT4: u8 = 0x84;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const LONG4: u8 = 0x8b;
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const EMPTY_SET: u8 = 0x8f;
    pub const ADDITEMS: u8 = 0x90;
    pub const FROZENSET: u8 = 0x91;
    pub const NEWOBJ_EX: u8 = 0x92;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
    pub const BYTEARRAY8: u8 = 0x96;
    pub const NEXT_BUFFER: u8 = 0x97;
    pub const READONLY_BUFFER: u8 = 0x98;
}

/// Errors raised while decoding a pickle stream.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PickleError {
    #[error("unexpected end of data at byte {0}")]
    UnexpectedEof(usize),
    #[error("unknown opcode 0x{opcode:02x} at byte {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("unsupported pickle feature: {0}")]
    Unsupported(&'static str),
    #[error("stack underflow at byte {0}")]
    StackUnderflow(usize),
    #[error("missing MARK at byte {0}")]
    MissingMark(usize),
    #[error("memo entry {0} not found")]
    MissingMemo(usize),
    #[error("unsupported numpy dtype '{0}'")]
    UnsupportedDtype(String),
    #[error("malformed pickle: {0}")]
    Malformed(String),
    #[error("recursive structure found")]
    Recursive,
}

/// A decoded pickle object.
///
/// Dicts keep the order the writer inserted their keys in. numpy arrays and scalars are
/// decoded into [`PickleValue::Array`] and [`PickleValue::Float`]; any other class instance
/// is kept as an opaque [`PickleValue::Object`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PickleValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PickleValue>),
    Tuple(Vec<PickleValue>),
    Set(Vec<PickleValue>),
    Dict(Vec<(PickleValue, PickleValue)>),
    Array(ArrayD<f64>),
    Global {
        module: String,
        name: String,
    },
    Object {
        module: String,
        name: String,
        args: Box<PickleValue>,
        state: Option<Box<PickleValue>>,
    },
    /// Memo slot shared by every stack entry that refers to it. Never part of a decoded result.
    MemoRef(usize),
}

/// Decodes a complete pickle stream (protocols 0 to 5, in-band buffers only).
pub(crate) fn from_slice(data: &[u8]) -> Result<PickleValue, PickleError> {
    Machine::new(data).run()
}

struct Machine<'a> {
    data: &'a [u8],
    pos: usize,
    stack: Vec<PickleValue>,
    marks: Vec<usize>,
    memo: HashMap<usize, PickleValue>,
}

impl<'a> Machine<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
        }
    }

    fn run(mut self) -> Result<PickleValue, PickleError> {
        loop {
            let offset = self.pos;
            let opcode = self.byte()?;
            match opcode {
                op::PROTO => {
                    let version = self.byte()?;
                    if version > 5 {
                        return Err(PickleError::Unsupported("pickle protocol above 5"));
                    }
                }
                op::FRAME => {
                    self.take(8)?;
                }
                op::STOP => {
                    let value = self.pop()?;
                    return self.resolve(&value, 0);
                }
                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    if self.marks.last() == Some(&self.stack.len()) {
                        self.marks.pop();
                    } else {
                        self.pop()?;
                    }
                }
                op::POP_MARK => {
                    self.pop_mark()?;
                }
                op::DUP => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(PickleError::StackUnderflow(offset))?;
                    self.stack.push(top);
                }

                op::NONE => self.stack.push(PickleValue::None),
                op::NEWTRUE => self.stack.push(PickleValue::Bool(true)),
                op::NEWFALSE => self.stack.push(PickleValue::Bool(false)),
                op::INT => {
                    let value = match self.text_line()? {
                        "00" => PickleValue::Bool(false),
                        "01" => PickleValue::Bool(true),
                        text => PickleValue::Int(parse_int(text)?),
                    };
                    self.stack.push(value);
                }
                op::LONG => {
                    let text = self.text_line()?;
                    self.stack.push(PickleValue::Int(parse_int(text.trim_end_matches('L'))?));
                }
                op::BININT => {
                    let b = self.take(4)?;
                    let value = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    self.stack.push(PickleValue::Int(value.into()));
                }
                op::BININT1 => {
                    let value = self.byte()?;
                    self.stack.push(PickleValue::Int(value.into()));
                }
                op::BININT2 => {
                    let b = self.take(2)?;
                    self.stack.push(PickleValue::Int(u16::from_le_bytes([b[0], b[1]]).into()));
                }
                op::LONG1 => {
                    let len = usize::from(self.byte()?);
                    let value = long_from_le_bytes(self.take(len)?)?;
                    self.stack.push(PickleValue::Int(value));
                }
                op::LONG4 => {
                    let len = self.len4()?;
                    let value = long_from_le_bytes(self.take(len)?)?;
                    self.stack.push(PickleValue::Int(value));
                }
                op::FLOAT => {
                    let text = self.text_line()?;
                    let value = text
                        .trim()
                        .parse()
                        .map_err(|_| PickleError::Malformed(format!("invalid float '{}'", text)))?;
                    self.stack.push(PickleValue::Float(value));
                }
                op::BINFLOAT => {
                    let b = self.take(8)?;
                    let value = f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                    self.stack.push(PickleValue::Float(value));
                }

                op::STRING => {
                    let text = unquote(self.line()?)?;
                    self.stack.push(PickleValue::Str(text));
                }
                op::BINSTRING => {
                    let len = self.len4()?;
                    let text = latin1(self.take(len)?);
                    self.stack.push(PickleValue::Str(text));
                }
                op::SHORT_BINSTRING => {
                    let len = usize::from(self.byte()?);
                    let text = latin1(self.take(len)?);
                    self.stack.push(PickleValue::Str(text));
                }
                op::UNICODE => {
                    let text = raw_unicode_escape(self.line()?)?;
                    self.stack.push(PickleValue::Str(text));
                }
                op::SHORT_BINUNICODE => {
                    let len = usize::from(self.byte()?);
                    let text = self.utf8(len)?;
                    self.stack.push(PickleValue::Str(text));
                }
                op::BINUNICODE => {
                    let len = self.len4()?;
                    let text = self.utf8(len)?;
                    self.stack.push(PickleValue::Str(text));
                }
                op::BINUNICODE8 => {
                    let len = self.len8()?;
                    let text = self.utf8(len)?;
                    self.stack.push(PickleValue::Str(text));
                }
                op::SHORT_BINBYTES => {
                    let len = usize::from(self.byte()?);
                    let bytes = self.take(len)?.to_vec();
                    self.stack.push(PickleValue::Bytes(bytes));
                }
                op::BINBYTES => {
                    let len = self.len4()?;
                    let bytes = self.take(len)?.to_vec();
                    self.stack.push(PickleValue::Bytes(bytes));
                }
                op::BINBYTES8 | op::BYTEARRAY8 => {
                    let len = self.len8()?;
                    let bytes = self.take(len)?.to_vec();
                    self.stack.push(PickleValue::Bytes(bytes));
                }
                op::NEXT_BUFFER => return Err(PickleError::Unsupported("out-of-band buffers")),
                op::READONLY_BUFFER => {}

                op::EMPTY_TUPLE => self.stack.push(PickleValue::Tuple(Vec::new())),
                op::TUPLE => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::Tuple(items));
                }
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let len = usize::from(opcode - op::TUPLE1 + 1);
                    let items = self.pop_n(len)?;
                    self.stack.push(PickleValue::Tuple(items));
                }
                op::EMPTY_LIST => self.stack.push(PickleValue::List(Vec::new())),
                op::LIST => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::List(items));
                }
                op::APPEND => {
                    let item = self.pop()?;
                    self.extend_list(vec![item])?;
                }
                op::APPENDS => {
                    let items = self.pop_mark()?;
                    self.extend_list(items)?;
                }
                op::EMPTY_DICT => self.stack.push(PickleValue::Dict(Vec::new())),
                op::DICT => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::Dict(Vec::new()));
                    self.set_items(items)?;
                }
                op::SETITEM => {
                    let items = self.pop_n(2)?;
                    self.set_items(items)?;
                }
                op::SETITEMS => {
                    let items = self.pop_mark()?;
                    self.set_items(items)?;
                }
                op::EMPTY_SET => self.stack.push(PickleValue::Set(Vec::new())),
                op::FROZENSET => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::Set(items));
                }
                op::ADDITEMS => {
                    let items = self.pop_mark()?;
                    match self.target_mut()? {
                        PickleValue::Set(set) => set.extend(items),
                        _ => return Err(PickleError::Malformed("ADDITEMS on a non-set".into())),
                    }
                }

                op::GLOBAL => {
                    let module = self.text_line()?.to_string();
                    let name = self.text_line()?.to_string();
                    self.stack.push(PickleValue::Global { module, name });
                }
                op::STACK_GLOBAL => {
                    let name = self.pop_str()?;
                    let module = self.pop_str()?;
                    self.stack.push(PickleValue::Global { module, name });
                }
                op::REDUCE => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    let value = self.reduce(&callable, args)?;
                    self.stack.push(value);
                }
                op::NEWOBJ => {
                    let args = self.pop()?;
                    let class = self.pop()?;
                    let value = self.instantiate(&class, args)?;
                    self.stack.push(value);
                }
                op::NEWOBJ_EX => {
                    let _kwargs = self.pop()?;
                    let args = self.pop()?;
                    let class = self.pop()?;
                    let value = self.instantiate(&class, args)?;
                    self.stack.push(value);
                }
                op::OBJ => {
                    let mut items = self.pop_mark()?;
                    if items.is_empty() {
                        return Err(PickleError::StackUnderflow(offset));
                    }
                    let class = items.remove(0);
                    let value = self.instantiate(&class, PickleValue::Tuple(items))?;
                    self.stack.push(value);
                }
                op::INST => {
                    let module = self.text_line()?.to_string();
                    let name = self.text_line()?.to_string();
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::Object {
                        module,
                        name,
                        args: Box::new(PickleValue::Tuple(items)),
                        state: None,
                    });
                }
                op::BUILD => {
                    let state = self.pop()?;
                    self.build(state)?;
                }

                op::PUT => {
                    let id = parse_index(self.text_line()?)?;
                    self.memoize(id)?;
                }
                op::BINPUT => {
                    let id = usize::from(self.byte()?);
                    self.memoize(id)?;
                }
                op::LONG_BINPUT => {
                    let id = self.len4()?;
                    self.memoize(id)?;
                }
                op::MEMOIZE => {
                    let id = self.memo.len();
                    self.memoize(id)?;
                }
                op::GET => {
                    let id = parse_index(self.text_line()?)?;
                    self.recall(id)?;
                }
                op::BINGET => {
                    let id = usize::from(self.byte()?);
                    self.recall(id)?;
                }
                op::LONG_BINGET => {
                    let id = self.len4()?;
                    self.recall(id)?;
                }

                op::PERSID | op::BINPERSID => {
                    return Err(PickleError::Unsupported("persistent ids"))
                }
                op::EXT1 | op::EXT2 | op::EXT4 => {
                    return Err(PickleError::Unsupported("extension registry"))
                }
                _ => return Err(PickleError::UnknownOpcode { opcode, offset }),
            }
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PickleError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(PickleError::UnexpectedEof(self.data.len()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self) -> Result<u8, PickleError> {
        Ok(self.take(1)?[0])
    }

    fn len4(&mut self) -> Result<usize, PickleError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn len8(&mut self) -> Result<usize, PickleError> {
        let b = self.take(8)?;
        let len = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        usize::try_from(len).map_err(|_| PickleError::Malformed(format!("length {} too large", len)))
    }

    fn utf8(&mut self, len: usize) -> Result<String, PickleError> {
        let offset = self.pos;
        String::from_utf8(self.take(len)?.to_vec())
            .map_err(|_| PickleError::Malformed(format!("invalid UTF-8 string at byte {}", offset)))
    }

    fn line(&mut self) -> Result<&'a [u8], PickleError> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(PickleError::UnexpectedEof(self.data.len()))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn text_line(&mut self) -> Result<&'a str, PickleError> {
        let offset = self.pos;
        std::str::from_utf8(self.line()?)
            .map_err(|_| PickleError::Malformed(format!("invalid text line at byte {}", offset)))
    }

    fn pop(&mut self) -> Result<PickleValue, PickleError> {
        if self.marks.last() == Some(&self.stack.len()) {
            return Err(PickleError::StackUnderflow(self.pos));
        }
        self.stack.pop().ok_or(PickleError::StackUnderflow(self.pos))
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<PickleValue>, PickleError> {
        let floor = self.marks.last().copied().unwrap_or(0);
        if self.stack.len() < floor + n {
            return Err(PickleError::StackUnderflow(self.pos));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn pop_mark(&mut self) -> Result<Vec<PickleValue>, PickleError> {
        let mark = self.marks.pop().ok_or(PickleError::MissingMark(self.pos))?;
        if mark > self.stack.len() {
            return Err(PickleError::MissingMark(self.pos));
        }
        Ok(self.stack.split_off(mark))
    }

    fn pop_str(&mut self) -> Result<String, PickleError> {
        let value = self.pop()?;
        match self.deref(&value)? {
            PickleValue::Str(s) => Ok(s.clone()),
            other => Err(PickleError::Malformed(format!(
                "expected a string for STACK_GLOBAL, found {}",
                other.kind()
            ))),
        }
    }

    /// Moves the top of the stack into memo slot `id`, leaving a reference in its place.
    fn memoize(&mut self, id: usize) -> Result<(), PickleError> {
        let top = self
            .stack
            .last_mut()
            .ok_or(PickleError::StackUnderflow(self.pos))?;
        if *top == PickleValue::MemoRef(id) {
            return Ok(());
        }
        let value = std::mem::replace(top, PickleValue::MemoRef(id));
        self.memo.insert(id, value);
        Ok(())
    }

    fn recall(&mut self, id: usize) -> Result<(), PickleError> {
        if !self.memo.contains_key(&id) {
            return Err(PickleError::MissingMemo(id));
        }
        self.stack.push(PickleValue::MemoRef(id));
        Ok(())
    }

    /// Follows memo references until a concrete value is reached.
    fn deref<'v>(&'v self, mut value: &'v PickleValue) -> Result<&'v PickleValue, PickleError> {
        for _ in 0..MAX_DEPTH {
            match value {
                PickleValue::MemoRef(id) => {
                    value = self.memo.get(id).ok_or(PickleError::MissingMemo(*id))?;
                }
                other => return Ok(other),
            }
        }
        Err(PickleError::Recursive)
    }

    /// The value on top of the stack, through the memo when it is a reference.
    fn target_mut(&mut self) -> Result<&mut PickleValue, PickleError> {
        let offset = self.pos;
        let mut id = match self.stack.last() {
            Some(PickleValue::MemoRef(id)) => *id,
            Some(_) => return self.stack.last_mut().ok_or(PickleError::StackUnderflow(offset)),
            None => return Err(PickleError::StackUnderflow(offset)),
        };
        for _ in 0..MAX_DEPTH {
            let next = match self.memo.get(&id) {
                Some(PickleValue::MemoRef(next)) => *next,
                Some(_) => return self.memo.get_mut(&id).ok_or(PickleError::MissingMemo(id)),
                None => return Err(PickleError::MissingMemo(id)),
            };
            id = next;
        }
        Err(PickleError::Recursive)
    }

    /// Copy of `value` with every memo reference replaced by the value it points at.
    fn resolve(&self, value: &PickleValue, depth: usize) -> Result<PickleValue, PickleError> {
        if depth > MAX_DEPTH {
            return Err(PickleError::Recursive);
        }
        let all = |items: &[PickleValue]| -> Result<Vec<PickleValue>, PickleError> {
            items.iter().map(|item| self.resolve(item, depth + 1)).collect()
        };
        Ok(match value {
            PickleValue::MemoRef(id) => {
                let target = self.memo.get(id).ok_or(PickleError::MissingMemo(*id))?;
                self.resolve(target, depth + 1)?
            }
            PickleValue::List(items) => PickleValue::List(all(items.as_slice())?),
            PickleValue::Tuple(items) => PickleValue::Tuple(all(items.as_slice())?),
            PickleValue::Set(items) => PickleValue::Set(all(items.as_slice())?),
            PickleValue::Dict(pairs) => PickleValue::Dict(
                pairs
                    .iter()
                    .map(|(key, value)| -> Result<(PickleValue, PickleValue), PickleError> {
                        Ok((self.resolve(key, depth + 1)?, self.resolve(value, depth + 1)?))
                    })
                    .collect::<Result<Vec<_>, PickleError>>()?,
            ),
            PickleValue::Object {
                module,
                name,
                args,
                state,
            } => PickleValue::Object {
                module: module.clone(),
                name: name.clone(),
                args: Box::new(self.resolve(args, depth + 1)?),
                state: match state {
                    Some(state) => Some(Box::new(self.resolve(state, depth + 1)?)),
                    None => None,
                },
            },
            other => other.clone(),
        })
    }

    fn global(&self, value: &PickleValue) -> Result<(String, String), PickleError> {
        match self.deref(value)? {
            PickleValue::Global { module, name } => Ok((module.clone(), name.clone())),
            other => Err(PickleError::Malformed(format!(
                "expected a class or function, found {}",
                other.kind()
            ))),
        }
    }

    fn reduce(&self, callable: &PickleValue, args: PickleValue) -> Result<PickleValue, PickleError> {
        let (module, name) = self.global(callable)?;
        match (module.as_str(), name.as_str()) {
            ("_codecs", "encode") | ("builtins" | "__builtin__", "bytes" | "bytearray") => {
                bytes_from_args(&self.resolve(&args, 0)?)
            }
            ("collections", "OrderedDict" | "defaultdict") => Ok(PickleValue::Dict(Vec::new())),
            (module, "_frombuffer") if numpy::is_numpy_module(module, "numeric") => {
                numpy::from_buffer(&self.resolve(&args, 0)?)
            }
            (module, "scalar") if numpy::is_numpy_module(module, "multiarray") => {
                numpy::scalar(&self.resolve(&args, 0)?)
            }
            _ => Ok(PickleValue::Object {
                module,
                name,
                args: Box::new(args),
                state: None,
            }),
        }
    }

    fn instantiate(&self, class: &PickleValue, args: PickleValue) -> Result<PickleValue, PickleError> {
        let (module, name) = self.global(class)?;
        if module == "collections" && name == "OrderedDict" {
            return Ok(PickleValue::Dict(Vec::new()));
        }
        Ok(PickleValue::Object {
            module,
            name,
            args: Box::new(args),
            state: None,
        })
    }

    fn build(&mut self, state: PickleValue) -> Result<(), PickleError> {
        let array = match self.stack.last() {
            Some(top) => match self.deref(top)? {
                PickleValue::Object { module, name, .. }
                    if name == "_reconstruct" && numpy::is_numpy_module(module, "multiarray") =>
                {
                    Some(numpy::reconstruct(&self.resolve(&state, 0)?)?)
                }
                _ => None,
            },
            None => return Err(PickleError::StackUnderflow(self.pos)),
        };

        let target = self.target_mut()?;
        match (target, array) {
            (target, Some(array)) => *target = array,
            (PickleValue::Object { state: slot, .. }, None) => *slot = Some(Box::new(state)),
            // Instance state on plain containers carries nothing the loader reads
            _ => {}
        }
        Ok(())
    }

    fn extend_list(&mut self, items: Vec<PickleValue>) -> Result<(), PickleError> {
        match self.target_mut()? {
            PickleValue::List(list) => {
                list.extend(items);
                Ok(())
            }
            other => Err(PickleError::Malformed(format!("cannot append to {}", other.kind()))),
        }
    }

    fn set_items(&mut self, items: Vec<PickleValue>) -> Result<(), PickleError> {
        if items.len() % 2 != 0 {
            return Err(PickleError::Malformed("odd number of dict items".into()));
        }
        match self.target_mut()? {
            PickleValue::Dict(pairs) => {
                let mut items = items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    pairs.push((key, value));
                }
                Ok(())
            }
            other => Err(PickleError::Malformed(format!("cannot set items on {}", other.kind()))),
        }
    }
}

fn parse_int(text: &str) -> Result<i64, PickleError> {
    text.trim()
        .parse()
        .map_err(|_| PickleError::Malformed(format!("invalid integer '{}'", text)))
}

fn parse_index(text: &str) -> Result<usize, PickleError> {
    text.trim()
        .parse()
        .map_err(|_| PickleError::Malformed(format!("invalid memo index '{}'", text)))
}

/// Two's complement little-endian integer, as written by LONG1 and LONG4.
fn long_from_le_bytes(bytes: &[u8]) -> Result<i64, PickleError> {
    if bytes.len() > 8 {
        return Err(PickleError::Unsupported("integers wider than 64 bits"));
    }
    let negative = bytes.last().map_or(false, |b| b & 0x80 != 0);
    let mut buf = if negative { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn hex_char(digits: &[u8]) -> Result<char, PickleError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|digits| u32::from_str_radix(digits, 16).ok())
        .and_then(char::from_u32)
        .ok_or_else(|| PickleError::Malformed(format!("invalid escape '{}'", latin1(digits))))
}

/// Decodes the quoted `repr` written by the protocol 0 STRING opcode.
fn unquote(line: &[u8]) -> Result<String, PickleError> {
    let inner = match line {
        [b'\'', inner @ .., b'\''] | [b'"', inner @ .., b'"'] => inner,
        _ => return Err(PickleError::Malformed("STRING argument is not quoted".into())),
    };
    let mut out = String::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        if inner[i] != b'\\' || i + 1 == inner.len() {
            out.push(char::from(inner[i]));
            i += 1;
            continue;
        }
        match inner[i + 1] {
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'x' if i + 3 < inner.len() => {
                out.push(hex_char(&inner[i + 2..i + 4])?);
                i += 2;
            }
            other => out.push(char::from(other)),
        }
        i += 2;
    }
    Ok(out)
}

/// Decodes the `raw-unicode-escape` text written by the protocol 0 UNICODE opcode.
fn raw_unicode_escape(line: &[u8]) -> Result<String, PickleError> {
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        let width = match (line[i], line.get(i + 1)) {
            (b'\\', Some(b'u')) => 4,
            (b'\\', Some(b'U')) => 8,
            _ => 0,
        };
        if width > 0 && i + 2 + width <= line.len() {
            out.push(hex_char(&line[i + 2..i + 2 + width])?);
            i += 2 + width;
        } else {
            out.push(char::from(line[i]));
            i += 1;
        }
    }
    Ok(out)
}

fn bytes_from_args(args: &PickleValue) -> Result<PickleValue, PickleError> {
    let items = match args {
        PickleValue::Tuple(items) => items.as_slice(),
        _ => return Err(PickleError::Malformed("bytes arguments are not a tuple".into())),
    };
    match items {
        [] => Ok(PickleValue::Bytes(Vec::new())),
        [PickleValue::Bytes(bytes)] => Ok(PickleValue::Bytes(bytes.clone())),
        // Python 3 writes bytes for protocols below 3 as a latin-1 encoded str
        [PickleValue::Str(text), ..] => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect::<Option<Vec<u8>>>()
            .map(PickleValue::Bytes)
            .ok_or_else(|| PickleError::Malformed("bytes text is not latin-1".into())),
        [PickleValue::List(values)] => values
            .iter()
            .map(|value| match value {
                PickleValue::Int(n) => u8::try_from(*n).ok(),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .map(PickleValue::Bytes)
            .ok_or_else(|| PickleError::Malformed("bytes list holds non-byte values".into())),
        _ => Err(PickleError::Malformed("unexpected bytes arguments".into())),
    }
}
