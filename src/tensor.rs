// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::float_cmp,
    clippy::pattern_type_mismatch
)]

//! Tensor types and tensor literals.
//!
//! Tensors are opaque values here: they have a type, a set of addressed cells, a textual
//! literal form and structural equality. No arithmetic is provided.

use crate::Rc;

use core::fmt;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Result};

/// Upper bound on the cells of a dense tensor value.
const MAX_DENSE_CELLS: usize = 1 << 20;

/// Value type of the cells of a tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellType {
    #[default]
    Double,
    Float,
    BFloat16,
    Int8,
}

impl CellType {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "double" => CellType::Double,
            "float" => CellType::Float,
            "bfloat16" => CellType::BFloat16,
            "int8" => CellType::Int8,
            _ => bail!("unknown tensor value type '{s}'"),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            CellType::Double => "double",
            CellType::Float => "float",
            CellType::BFloat16 => "bfloat16",
            CellType::Int8 => "int8",
        }
    }

    /// Rounds a value to what a cell of this type can hold.
    fn normalize(&self, v: f64) -> f64 {
        match self {
            CellType::Double => v,
            CellType::Float => v as f32 as f64,
            CellType::BFloat16 => f32::from_bits((v as f32).to_bits() & 0xFFFF_0000) as f64,
            CellType::Int8 => v as i8 as f64,
        }
    }
}

/// A tensor dimension: mapped (`name{}`) or indexed with a size (`name[N]`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dimension {
    name: Rc<str>,
    size: Option<usize>,
}

impl Dimension {
    pub fn mapped(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn indexed(name: impl Into<Rc<str>>, size: usize) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The size of an indexed dimension, `None` for mapped ones.
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn is_indexed(&self) -> bool {
        self.size.is_some()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(n) => write!(f, "{}[{n}]", self.name),
            None => write!(f, "{}{{}}", self.name),
        }
    }
}

/// The type of a tensor: cell value type and dimensions, kept sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TensorType {
    cell_type: CellType,
    dimensions: Vec<Dimension>,
}

impl TensorType {
    pub fn new(cell_type: CellType, mut dimensions: Vec<Dimension>) -> Result<Self> {
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in dimensions.windows(2) {
            if pair[0].name == pair[1].name {
                bail!("dimension '{}' is declared more than once", pair[0].name);
            }
        }
        Ok(Self {
            cell_type,
            dimensions,
        })
    }

    /// Parses `tensor(x[3],y{})` or `tensor<float>(x[3])`.
    pub fn parse(text: &str) -> Result<Self> {
        let s = text.trim();
        let Some(rest) = s.strip_prefix("tensor") else {
            bail!("a tensor type must start with 'tensor'");
        };
        let (cell_type, rest) = match rest.strip_prefix('<') {
            Some(r) => {
                let end = r
                    .find('>')
                    .ok_or_else(|| anyhow!("missing '>' after tensor value type"))?;
                (CellType::parse(r[..end].trim())?, &r[end + 1..])
            }
            None => (CellType::Double, rest),
        };
        let Some(body) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
            bail!("tensor dimensions must be enclosed in '(' and ')'");
        };

        let mut dimensions = vec![];
        for dim in body.split(',').map(str::trim) {
            if dim.is_empty() {
                if body.trim().is_empty() {
                    break;
                }
                bail!("empty dimension in '{text}'");
            }
            dimensions.push(parse_dimension(dim)?);
        }
        Self::new(cell_type, dimensions)
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// True if every dimension is indexed (a dense tensor). The scalar type is not dense.
    pub fn is_dense(&self) -> bool {
        !self.dimensions.is_empty() && self.dimensions.iter().all(Dimension::is_indexed)
    }

    /// Number of cells of a dense type, which must not exceed [`MAX_DENSE_CELLS`].
    fn dense_size(&self) -> Result<usize> {
        let mut size = 1usize;
        for dim in &self.dimensions {
            size = size
                .checked_mul(dim.size.unwrap_or(0))
                .filter(|&n| n <= MAX_DENSE_CELLS)
                .ok_or_else(|| anyhow!("{self} has more than {MAX_DENSE_CELLS} cells"))?;
        }
        Ok(size)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name.as_ref() == name)
    }

    /// All addresses of a dense type in row-major order.
    fn dense_addresses(&self) -> Vec<Vec<Rc<str>>> {
        let mut addresses: Vec<Vec<Rc<str>>> = vec![vec![]];
        for dim in &self.dimensions {
            let size = dim.size.unwrap_or(0);
            addresses = addresses
                .into_iter()
                .flat_map(|prefix| {
                    (0..size).map(move |i| {
                        let mut a = prefix.clone();
                        a.push(Rc::from(i.to_string()));
                        a
                    })
                })
                .collect();
        }
        addresses
    }
}

fn parse_dimension(text: &str) -> Result<Dimension> {
    let valid_name = |n: &str| {
        let mut chars = n.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if let Some(name) = text.strip_suffix("{}") {
        let name = name.trim();
        if !valid_name(name) {
            bail!("invalid dimension name '{name}'");
        }
        return Ok(Dimension::mapped(name));
    }
    if let Some(open) = text.find('[') {
        let name = text[..open].trim();
        let Some(size) = text[open + 1..].strip_suffix(']') else {
            bail!("missing ']' in dimension '{text}'");
        };
        if !valid_name(name) {
            bail!("invalid dimension name '{name}'");
        }
        let size: usize = size
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid size in dimension '{text}'"))?;
        if size == 0 {
            bail!("dimension '{name}' must have a positive size");
        }
        return Ok(Dimension::indexed(name, size));
    }
    bail!("dimension '{text}' must be written 'name{{}}' or 'name[size]'")
}

impl FromStr for TensorType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tensor")?;
        if self.cell_type != CellType::Double {
            write!(f, "<{}>", self.cell_type.name())?;
        }
        f.write_str("(")?;
        for (i, d) in self.dimensions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str(")")
    }
}

/// A tensor value: a type plus cells addressed by one label per dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    tensor_type: TensorType,
    cells: BTreeMap<Vec<Rc<str>>, f64>,
}

impl Tensor {
    /// Builds a tensor from `(address, value)` pairs, where an address maps dimension names
    /// to labels. Dense types get every cell, missing ones set to zero.
    pub fn from_cells<'a, I>(tensor_type: TensorType, cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Vec<(&'a str, &'a str)>, f64)>,
    {
        let mut tensor = Self::empty(tensor_type);
        for (address, value) in cells {
            tensor.insert(&address, value)?;
        }
        tensor.fill_dense()?;
        Ok(tensor)
    }

    /// Parses a tensor literal, optionally checking it against an expected type.
    ///
    /// Accepted forms, each optionally prefixed by `tensor<..>(..):`
    ///   - `{{x:a, y:0}:1.0, ...}`: general form
    ///   - `{a:1.0, b:2.0}`: short form for a single mapped dimension
    ///   - `[1, 2, 3]` or `[[1, 2], [3, 4]]`: dense form for indexed types
    ///   - `5.0`: a scalar
    ///
    /// Without a type prefix or expected type, a mapped `double` type is inferred from the
    /// dimension names used in the addresses.
    pub fn parse(text: &str, expected: Option<&TensorType>) -> Result<Self> {
        let text = text.trim();
        let (explicit, body) = split_type_prefix(text)?;
        let tensor_type = match (explicit, expected) {
            (Some(t), Some(e)) if &t != e => bail!("Require a tensor of type {e}"),
            (Some(t), _) => Some(t),
            (None, e) => e.cloned(),
        };

        let body = body.trim();
        let mut tensor = if body.starts_with('{') {
            parse_mapped(body, tensor_type)?
        } else if body.starts_with('[') {
            let Some(t) = tensor_type else {
                bail!("a dense tensor literal requires a tensor type");
            };
            parse_dense(body, t)?
        } else {
            let t = tensor_type.unwrap_or_default();
            if !t.dimensions.is_empty() {
                bail!("a single number is only a valid value for a scalar tensor, not {t}");
            }
            let v: f64 = body
                .parse()
                .map_err(|_| anyhow!("'{body}' is not a tensor literal"))?;
            let mut tensor = Self::empty(t);
            tensor.insert(&[], v)?;
            tensor
        };
        tensor.fill_dense()?;
        Ok(tensor)
    }

    fn empty(tensor_type: TensorType) -> Self {
        Self {
            tensor_type,
            cells: BTreeMap::new(),
        }
    }

    fn insert(&mut self, address: &[(&str, &str)], value: f64) -> Result<()> {
        let dims = &self.tensor_type.dimensions;
        if address.len() != dims.len() {
            bail!(
                "address has {} dimensions but {} has {}",
                address.len(),
                self.tensor_type,
                dims.len()
            );
        }
        let mut key: Vec<Option<Rc<str>>> = vec![None; dims.len()];
        for (name, label) in address {
            let Some(i) = self.tensor_type.index_of(name) else {
                bail!("{} has no dimension '{name}'", self.tensor_type);
            };
            if let Some(size) = dims[i].size {
                let index: usize = label
                    .parse()
                    .map_err(|_| anyhow!("label '{label}' of indexed dimension '{name}' is not an index"))?;
                if index >= size {
                    bail!("index {index} is out of range for dimension '{name}' of size {size}");
                }
                key[i] = Some(Rc::from(index.to_string()));
            } else {
                key[i] = Some(Rc::from(*label));
            }
        }
        let key = key
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| anyhow!("address lists a dimension more than once"))?;
        let value = self.tensor_type.cell_type.normalize(value);
        self.cells.insert(key, value);
        Ok(())
    }

    fn fill_dense(&mut self) -> Result<()> {
        if !self.tensor_type.is_dense() {
            return Ok(());
        }
        self.tensor_type.dense_size()?;
        for address in self.tensor_type.dense_addresses() {
            self.cells.entry(address).or_insert(0.0);
        }
        Ok(())
    }

    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    /// The cell at the given labels (in dimension name order).
    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        let key: Vec<Rc<str>> = labels.iter().map(|l| Rc::from(*l)).collect();
        self.cells.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromStr for Tensor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, None)
    }
}

fn split_type_prefix(text: &str) -> Result<(Option<TensorType>, &str)> {
    if !text.starts_with("tensor") {
        return Ok((None, text));
    }
    let close = text
        .find(')')
        .ok_or_else(|| anyhow!("missing ')' in tensor type of '{text}'"))?;
    let tensor_type = TensorType::parse(&text[..=close])?;
    let Some(body) = text[close + 1..].trim_start().strip_prefix(':') else {
        bail!("expected ':' after the tensor type in '{text}'");
    };
    Ok((Some(tensor_type), body))
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        if self.eat(ch) {
            Ok(())
        } else {
            bail!("expected '{ch}' at position {} in '{}'", self.pos, self.text)
        }
    }

    /// Reads up to (not including) the first of `stops`, trimmed and unquoted.
    fn token(&mut self, stops: &[char]) -> Result<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let end = rest.find(|c| stops.contains(&c)).unwrap_or(rest.len());
        self.pos += end;
        let token = rest[..end].trim();
        let token = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .or_else(|| token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
            .unwrap_or(token);
        if token.is_empty() {
            bail!("empty label or value at position {} in '{}'", self.pos, self.text);
        }
        Ok(token)
    }

    fn number(&mut self, stops: &[char]) -> Result<f64> {
        let token = self.token(stops)?;
        token
            .parse()
            .map_err(|_| anyhow!("'{token}' is not a number"))
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.text.len()
    }
}

fn parse_mapped(body: &str, tensor_type: Option<TensorType>) -> Result<Tensor> {
    let short_dim: Option<Rc<str>> = tensor_type
        .as_ref()
        .filter(|t| t.dimensions.len() == 1)
        .map(|t| t.dimensions[0].name.clone());
    let mut cursor = Cursor::new(body);
    cursor.expect('{')?;
    let mut cells: Vec<(Vec<(&str, &str)>, f64)> = vec![];
    if !cursor.eat('}') {
        loop {
            let address = if cursor.eat('{') {
                let mut address = vec![];
                if !cursor.eat('}') {
                    loop {
                        let dim = cursor.token(&[':'])?;
                        cursor.expect(':')?;
                        let label = cursor.token(&[',', '}'])?;
                        address.push((dim, label));
                        if cursor.eat('}') {
                            break;
                        }
                        cursor.expect(',')?;
                    }
                }
                address
            } else {
                let label = cursor.token(&[':'])?;
                let dim: &str = match (&short_dim, &tensor_type) {
                    (Some(d), _) => &**d,
                    (None, Some(t)) => bail!("the short form '{{label:value}}' requires a single dimension, not {t}"),
                    (None, None) => bail!("the short form '{{label:value}}' requires a tensor type"),
                };
                vec![(dim, label)]
            };
            cursor.expect(':')?;
            let value = cursor.number(&[',', '}'])?;
            cells.push((address, value));
            if cursor.eat('}') {
                break;
            }
            cursor.expect(',')?;
        }
    }
    if !cursor.at_end() {
        bail!("unexpected trailing text in tensor literal '{body}'");
    }

    let tensor_type = match tensor_type {
        Some(t) => t,
        None => infer_type(&cells)?,
    };
    let mut tensor = Tensor::empty(tensor_type);
    for (address, value) in cells {
        tensor.insert(&address, value)?;
    }
    Ok(tensor)
}

fn infer_type(cells: &[(Vec<(&str, &str)>, f64)]) -> Result<TensorType> {
    let mut names: Option<BTreeSet<&str>> = None;
    for (address, _) in cells {
        let these: BTreeSet<&str> = address.iter().map(|(d, _)| *d).collect();
        match &names {
            Some(n) if *n != these => bail!("all cells of a tensor must use the same dimensions"),
            Some(_) => {}
            None => names = Some(these),
        }
    }
    let dimensions = names
        .unwrap_or_default()
        .into_iter()
        .map(Dimension::mapped)
        .collect();
    TensorType::new(CellType::Double, dimensions)
}

fn parse_dense(body: &str, tensor_type: TensorType) -> Result<Tensor> {
    if !tensor_type.is_dense() {
        bail!("the dense form '[...]' requires a type with only indexed dimensions, not {tensor_type}");
    }
    let mut values = vec![];
    let mut depth = 0usize;
    let mut cursor = Cursor::new(body);
    loop {
        match cursor.peek() {
            Some('[') => {
                cursor.pos += 1;
                depth += 1;
            }
            Some(']') => {
                cursor.pos += 1;
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("unbalanced ']' in '{body}'"))?;
                if depth == 0 {
                    break;
                }
            }
            Some(',') => cursor.pos += 1,
            Some(_) => values.push(cursor.number(&[',', ']', '['])?),
            None => bail!("unterminated dense tensor literal '{body}'"),
        }
    }
    if !cursor.at_end() {
        bail!("unexpected trailing text in tensor literal '{body}'");
    }

    let expected = tensor_type.dense_size()?;
    if values.len() != expected {
        bail!(
            "{tensor_type} has {expected} cells but {} values were given",
            values.len()
        );
    }
    let cell_type = tensor_type.cell_type;
    let cells = tensor_type
        .dense_addresses()
        .into_iter()
        .zip(values)
        .map(|(address, v)| (address, cell_type.normalize(v)))
        .collect();
    Ok(Tensor { tensor_type, cells })
}

fn write_value(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    write!(f, "{v:?}")
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.tensor_type)?;
        if self.tensor_type.is_dense() {
            let sizes: Vec<usize> = self
                .tensor_type
                .dimensions
                .iter()
                .map(|d| d.size.unwrap_or(0))
                .collect();
            let values: Vec<f64> = self
                .tensor_type
                .dense_addresses()
                .iter()
                .map(|a| self.cells.get(a).copied().unwrap_or(0.0))
                .collect();
            return write_dense(f, &sizes, &values);
        }
        f.write_str("{")?;
        for (i, (address, value)) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("{")?;
            for (j, (dim, label)) in self.tensor_type.dimensions.iter().zip(address).enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}:{label}", dim.name)?;
            }
            f.write_str("}:")?;
            write_value(f, *value)?;
        }
        f.write_str("}")
    }
}

fn write_dense(f: &mut fmt::Formatter<'_>, sizes: &[usize], values: &[f64]) -> fmt::Result {
    f.write_str("[")?;
    match sizes {
        [] | [_] => {
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_value(f, *v)?;
            }
        }
        [_, inner @ ..] => {
            let stride: usize = inner.iter().product();
            for (i, chunk) in values.chunks(stride.max(1)).enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_dense(f, inner, chunk)?;
            }
        }
    }
    f.write_str("]")
}
