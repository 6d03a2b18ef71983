//! The structured value tree SFS encodes and decodes, standing in for the
//! SEXP tree the original C project serializes. This is the type the object
//! store's `structured` artifact slot holds (wrapped in a `StructuredHandle`).

/// A pairlist/call entry: an optional name (the R "tag") and a value.
pub type Pair = (Option<String>, Value);

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Nil,
    Sym(String),
    List(Vec<Pair>),
    Lang(Vec<Pair>),
    Clo {
        formals: Box<Value>,
        body: Box<Value>,
        env: Box<Value>,
    },
    /// Environments are never serialized (spec.md §4.D); decoding one always
    /// yields `Value::nil()` with a warning, so this variant only appears as
    /// an encode-side placeholder in tests exercising that path.
    Env,
    Char(String),
    Lgl(Vec<i32>),
    Int(Vec<i32>),
    Real(Vec<f64>),
    Cplx(Vec<(f64, f64)>),
    Str(Vec<String>),
    Vec(Vec<Value>),
    Raw(Vec<u8>),
    S4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub kind: ValueKind,
    pub attributes: Vec<(String, Value)>,
    /// Set when the decoded attribute chain contained a key named `"class"`,
    /// per spec.md §4.D.
    pub is_object: bool,
}

impl Value {
    pub fn new(kind: ValueKind) -> Value {
        Value {
            kind,
            attributes: Vec::new(),
            is_object: false,
        }
    }

    pub fn nil() -> Value {
        Value::new(ValueKind::Nil)
    }

    pub fn sym<S: Into<String>>(name: S) -> Value {
        Value::new(ValueKind::Sym(name.into()))
    }

    pub fn char<S: Into<String>>(s: S) -> Value {
        Value::new(ValueKind::Char(s.into()))
    }

    pub fn int(values: Vec<i32>) -> Value {
        Value::new(ValueKind::Int(values))
    }

    pub fn real(values: Vec<f64>) -> Value {
        Value::new(ValueKind::Real(values))
    }

    pub fn raw(bytes: Vec<u8>) -> Value {
        Value::new(ValueKind::Raw(bytes))
    }

    pub fn str_vec(values: Vec<String>) -> Value {
        Value::new(ValueKind::Str(values))
    }

    pub fn vec(values: Vec<Value>) -> Value {
        Value::new(ValueKind::Vec(values))
    }

    /// Attaches an attribute, recomputing `is_object` if it is named `"class"`.
    pub fn with_attribute(mut self, name: &str, value: Value) -> Value {
        if name == "class" {
            self.is_object = true;
        }
        self.attributes.push((name.to_string(), value));
        self
    }
}
