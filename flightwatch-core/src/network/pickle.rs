//! Graphite pickle payloads.
//!
//! A batch of metrics is a pickled list of `(name, (timestamp, value))`
//! tuples. Encoding writes protocol 2 exactly as CPython's pickler does, so
//! any Carbon-compatible receiver can load it. Decoding accepts the opcode
//! subset such receivers and older clients produce for this shape.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

/// One data point: metric path, unix timestamp in seconds, value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedMetric {
    pub name: String,
    pub timestamp: i64,
    pub value: f64,
}

impl TimestampedMetric {
    pub fn new(name: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            value,
        }
    }
}

impl fmt::Display for TimestampedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.value, self.timestamp)
    }
}

mod opcode {
    pub const PROTO: u8 = 0x80;
    pub const STOP: u8 = b'.';
    pub const MARK: u8 = b'(';
    pub const EMPTY_LIST: u8 = b']';
    pub const APPEND: u8 = b'a';
    pub const APPENDS: u8 = b'e';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const TUPLE: u8 = b't';
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const BINGET: u8 = b'h';
    pub const LONG_BINGET: u8 = b'j';
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const BININT2: u8 = b'M';
    pub const LONG1: u8 = 0x8a;
    pub const BINFLOAT: u8 = b'G';
    pub const BINUNICODE: u8 = b'X';
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
}

/// Items per MARK/APPENDS batch, as CPython's pickler batches list items.
const APPEND_BATCH_SIZE: usize = 1000;

// ── Encoding ──────────────────────────────────────────────────────────────────

struct Encoder {
    out: Vec<u8>,
    next_memo: u32,
}

impl Encoder {
    fn memoize(&mut self) {
        match u8::try_from(self.next_memo) {
            Ok(idx) => self.out.extend_from_slice(&[opcode::BINPUT, idx]),
            Err(_) => {
                self.out.push(opcode::LONG_BINPUT);
                self.out.extend_from_slice(&self.next_memo.to_le_bytes());
            }
        }
        self.next_memo += 1;
    }

    fn string(&mut self, value: &str) {
        self.out.push(opcode::BINUNICODE);
        self.out
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.out.extend_from_slice(value.as_bytes());
        self.memoize();
    }

    fn int(&mut self, value: i64) {
        if (0..=0xff).contains(&value) {
            self.out.extend_from_slice(&[opcode::BININT1, value as u8]);
        } else if (0..=0xffff).contains(&value) {
            self.out.push(opcode::BININT2);
            self.out.extend_from_slice(&(value as u16).to_le_bytes());
        } else if let Ok(value) = i32::try_from(value) {
            self.out.push(opcode::BININT);
            self.out.extend_from_slice(&value.to_le_bytes());
        } else {
            let bytes = minimal_twos_complement(value);
            self.out.extend_from_slice(&[opcode::LONG1, bytes.len() as u8]);
            self.out.extend_from_slice(&bytes);
        }
    }

    fn float(&mut self, value: f64) {
        self.out.push(opcode::BINFLOAT);
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn metric(&mut self, metric: &TimestampedMetric) {
        self.string(&metric.name);
        self.int(metric.timestamp);
        self.float(metric.value);
        self.out.push(opcode::TUPLE2);
        self.memoize();
        self.out.push(opcode::TUPLE2);
        self.memoize();
    }
}

/// Little-endian two's complement without redundant sign bytes.
fn minimal_twos_complement(value: i64) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let sign_of_rest = bytes[bytes.len() - 2] & 0x80;
        let redundant =
            (last == 0x00 && sign_of_rest == 0) || (last == 0xff && sign_of_rest != 0);
        if !redundant {
            break;
        }
        bytes.pop();
    }
    bytes
}

/// Pickle `metrics` as a protocol 2 list of `(name, (timestamp, value))`.
pub fn encode_metrics(metrics: &[TimestampedMetric]) -> Vec<u8> {
    let mut encoder = Encoder {
        out: vec![opcode::PROTO, 2, opcode::EMPTY_LIST],
        next_memo: 0,
    };
    encoder.memoize();

    for batch in metrics.chunks(APPEND_BATCH_SIZE) {
        if let [single] = batch {
            encoder.metric(single);
            encoder.out.push(opcode::APPEND);
        } else {
            encoder.out.push(opcode::MARK);
            for metric in batch {
                encoder.metric(metric);
            }
            encoder.out.push(opcode::APPENDS);
        }
    }

    encoder.out.push(opcode::STOP);
    encoder.out
}

// ── Decoding ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Mark,
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    stack: Vec<Value>,
    /// Sparse: `LONG_BINPUT` may name any 32-bit slot.
    memo: HashMap<usize, Value>,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| anyhow!("truncated pickle at offset {}", self.pos))?;
        let input = self.input;
        let bytes = &input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32_le(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn pop(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(Value::Mark) | None => bail!("pickle stack underflow at offset {}", self.pos),
            Some(value) => Ok(value),
        }
    }

    fn pop_to_mark(&mut self) -> Result<Vec<Value>> {
        let mark = self
            .stack
            .iter()
            .rposition(|v| matches!(v, Value::Mark))
            .ok_or_else(|| anyhow!("pickle MARK not found at offset {}", self.pos))?;
        let items = self.stack.split_off(mark + 1);
        self.stack.pop();
        Ok(items)
    }

    fn top(&self) -> Result<&Value> {
        self.stack
            .last()
            .ok_or_else(|| anyhow!("pickle stack empty at offset {}", self.pos))
    }

    fn put(&mut self, idx: usize) -> Result<()> {
        let value = self.top()?.clone();
        self.memo.insert(idx, value);
        Ok(())
    }

    fn get(&mut self, idx: usize) -> Result<()> {
        let value = self
            .memo
            .get(&idx)
            .cloned()
            .ok_or_else(|| anyhow!("pickle memo {} is empty", idx))?;
        self.stack.push(value);
        Ok(())
    }

    fn extend_list(&mut self, items: Vec<Value>) -> Result<()> {
        match self.stack.last_mut() {
            Some(Value::List(list)) => {
                list.extend(items);
                Ok(())
            }
            _ => bail!("pickle append target is not a list"),
        }
    }

    fn text(bytes: &[u8]) -> Result<Value> {
        Ok(Value::Str(String::from_utf8(bytes.to_vec())?))
    }

    fn run(mut self) -> Result<Value> {
        loop {
            let op = self.byte()?;
            match op {
                opcode::PROTO => {
                    let version = self.byte()?;
                    if version > 5 {
                        bail!("unsupported pickle protocol {}", version);
                    }
                }
                opcode::FRAME => {
                    self.take(8)?;
                }
                opcode::STOP => return self.pop(),
                opcode::MARK => self.stack.push(Value::Mark),
                opcode::EMPTY_LIST => self.stack.push(Value::List(Vec::new())),
                opcode::EMPTY_TUPLE => self.stack.push(Value::Tuple(Vec::new())),
                opcode::APPEND => {
                    let item = self.pop()?;
                    self.extend_list(vec![item])?;
                }
                opcode::APPENDS => {
                    let items = self.pop_to_mark()?;
                    self.extend_list(items)?;
                }
                opcode::TUPLE => {
                    let items = self.pop_to_mark()?;
                    self.stack.push(Value::Tuple(items));
                }
                opcode::TUPLE1 | opcode::TUPLE2 | opcode::TUPLE3 => {
                    let n = (op - opcode::TUPLE1 + 1) as usize;
                    let mut items = Vec::with_capacity(n);
                    for _ in 0..n {
                        items.push(self.pop()?);
                    }
                    items.reverse();
                    self.stack.push(Value::Tuple(items));
                }
                opcode::BINPUT => {
                    let idx = self.byte()? as usize;
                    self.put(idx)?;
                }
                opcode::LONG_BINPUT => {
                    let idx = self.u32_le()? as usize;
                    self.put(idx)?;
                }
                opcode::MEMOIZE => {
                    let idx = self.memo.len();
                    self.put(idx)?;
                }
                opcode::BINGET => {
                    let idx = self.byte()? as usize;
                    self.get(idx)?;
                }
                opcode::LONG_BINGET => {
                    let idx = self.u32_le()? as usize;
                    self.get(idx)?;
                }
                opcode::BININT1 => {
                    let v = self.byte()?;
                    self.stack.push(Value::Int(v as i64));
                }
                opcode::BININT2 => {
                    let b = self.take(2)?;
                    self.stack
                        .push(Value::Int(u16::from_le_bytes([b[0], b[1]]) as i64));
                }
                opcode::BININT => {
                    let b = self.take(4)?;
                    self.stack
                        .push(Value::Int(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64));
                }
                opcode::LONG1 => {
                    let n = self.byte()? as usize;
                    if n > 8 {
                        bail!("pickle LONG1 of {} bytes does not fit in i64", n);
                    }
                    let bytes = self.take(n)?;
                    let mut buf = match bytes.last() {
                        Some(last) if last & 0x80 != 0 => [0xff; 8],
                        _ => [0u8; 8],
                    };
                    buf[..n].copy_from_slice(bytes);
                    self.stack.push(Value::Int(i64::from_le_bytes(buf)));
                }
                opcode::BINFLOAT => {
                    let b = self.take(8)?;
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(b);
                    self.stack.push(Value::Float(f64::from_be_bytes(buf)));
                }
                opcode::BINUNICODE | opcode::BINSTRING => {
                    let n = self.u32_le()? as usize;
                    let bytes = self.take(n)?;
                    self.stack.push(Self::text(bytes)?);
                }
                opcode::SHORT_BINUNICODE | opcode::SHORT_BINSTRING => {
                    let n = self.byte()? as usize;
                    let bytes = self.take(n)?;
                    self.stack.push(Self::text(bytes)?);
                }
                other => bail!(
                    "unsupported pickle opcode 0x{:02x} at offset {}",
                    other,
                    self.pos - 1
                ),
            }
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

fn metric_from(value: Value) -> Result<TimestampedMetric> {
    let Value::Tuple(outer) = value else {
        bail!("metric is not a tuple");
    };
    let [Value::Str(name), Value::Tuple(point)] = outer.as_slice() else {
        bail!("metric is not a (name, (timestamp, value)) tuple");
    };
    let [timestamp, value] = point.as_slice() else {
        bail!("metric point for {} is not a (timestamp, value) pair", name);
    };
    let timestamp = match timestamp {
        Value::Int(ts) => *ts,
        Value::Float(ts) => *ts as i64,
        _ => bail!("metric {} has a non-numeric timestamp", name),
    };
    let value = number(value).ok_or_else(|| anyhow!("metric {} has a non-numeric value", name))?;
    Ok(TimestampedMetric::new(name.clone(), timestamp, value))
}

/// Decode a pickled list of `(name, (timestamp, value))` tuples.
pub fn decode_metrics(payload: &[u8]) -> Result<Vec<TimestampedMetric>> {
    let decoder = Decoder {
        input: payload,
        pos: 0,
        stack: Vec::new(),
        memo: HashMap::new(),
    };
    let Value::List(items) = decoder.run()? else {
        bail!("pickle payload is not a list");
    };
    items.into_iter().map(metric_from).collect()
}

#[cfg(test)]
#[path = "tests/pickle_tests.rs"]
mod tests;
