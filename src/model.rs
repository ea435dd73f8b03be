use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "c" | "h" => Ok(Language::C),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Byte and row/column extent of a CST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl Span {
    pub fn of(node: Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_row: start.row,
            start_col: start.column,
            end_row: end.row,
            end_col: end.column,
        }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start_byte <= other.start_byte && other.end_byte <= self.end_byte
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start_byte..self.end_byte).unwrap_or("")
    }
}

/// Identity of a symbol: the file that declares it and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolKey {
    pub file: String,
    pub name: String,
}

impl SymbolKey {
    pub fn new(file: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataTypeKind {
    Class,
    Struct,
    Enum,
    Union,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionRole {
    Signature,
    Definition,
}

/// Fields shared by every symbol variant.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolCore {
    pub name: String,
    pub file: String,
    /// Defining nodes in source order. More than one when a language merges
    /// repeated declarations of the same name.
    pub nodes: Vec<Span>,
    pub identifier: Span,
}

impl SymbolCore {
    pub fn new(file: &str, name: &str, node: Span, identifier: Span) -> Self {
        Self {
            name: name.to_string(),
            file: file.to_string(),
            nodes: vec![node],
            identifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Function {
        core: SymbolCore,
        role: FunctionRole,
        is_macro: bool,
        /// The matching declaration or definition in another file.
        counterpart: Option<SymbolKey>,
    },
    Variable {
        core: SymbolCore,
        is_macro: bool,
    },
    DataType {
        core: SymbolCore,
        kind: DataTypeKind,
        typedefs: BTreeSet<SymbolKey>,
    },
    Typedef {
        core: SymbolCore,
        datatype: Option<SymbolKey>,
    },
}

impl Symbol {
    pub fn core(&self) -> &SymbolCore {
        match self {
            Symbol::Function { core, .. }
            | Symbol::Variable { core, .. }
            | Symbol::DataType { core, .. }
            | Symbol::Typedef { core, .. } => core,
        }
    }

    pub fn core_mut(&mut self) -> &mut SymbolCore {
        match self {
            Symbol::Function { core, .. }
            | Symbol::Variable { core, .. }
            | Symbol::DataType { core, .. }
            | Symbol::Typedef { core, .. } => core,
        }
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn file(&self) -> &str {
        &self.core().file
    }

    pub fn nodes(&self) -> &[Span] {
        &self.core().nodes
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey::new(self.file(), self.name())
    }

    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Function { is_macro: true, .. } | Symbol::Variable { is_macro: true, .. } => {
                SymbolKind::Macro
            }
            Symbol::Function { .. } => SymbolKind::Function,
            Symbol::Variable { .. } => SymbolKind::Variable,
            Symbol::DataType { kind, .. } => match kind {
                DataTypeKind::Class => SymbolKind::Class,
                DataTypeKind::Struct => SymbolKind::Struct,
                DataTypeKind::Enum => SymbolKind::Enum,
                DataTypeKind::Union => SymbolKind::Union,
            },
            Symbol::Typedef { .. } => SymbolKind::Typedef,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Variable,
    Class,
    Struct,
    Enum,
    Union,
    Typedef,
    Macro,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub lines_count: usize,
    pub code_line_count: usize,
    pub character_count: usize,
    pub code_character_count: usize,
    pub dependency_count: usize,
    pub dependent_count: usize,
    pub cyclomatic_complexity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub id: String,
    pub is_external: bool,
    pub symbols: BTreeMap<String, String>,
}

impl DependencyEdge {
    pub fn new(id: &str, is_external: bool) -> Self {
        Self {
            id: id.to_string(),
            is_external,
            symbols: BTreeMap::new(),
        }
    }

    pub fn add_symbol(&mut self, name: &str) {
        self.symbols.insert(name.to_string(), name.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentEdge {
    pub id: String,
    pub symbols: BTreeMap<String, String>,
}

impl DependentEdge {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            symbols: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolManifest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SymbolKind,
    pub metrics: Metrics,
    pub dependencies: BTreeMap<String, DependencyEdge>,
    pub dependents: BTreeMap<String, DependentEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileManifest {
    pub id: String,
    pub file_path: String,
    pub language: Language,
    pub metrics: Metrics,
    pub dependencies: BTreeMap<String, DependencyEdge>,
    pub dependents: BTreeMap<String, DependentEdge>,
    pub symbols: BTreeMap<String, SymbolManifest>,
}

/// File id to file record, serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub files: BTreeMap<String, FileManifest>,
}

impl Manifest {
    pub fn file(&self, id: &str) -> Option<&FileManifest> {
        self.files.get(id)
    }

    pub fn symbol(&self, key: &SymbolKey) -> Option<&SymbolManifest> {
        self.files
            .get(&key.file)
            .and_then(|file| file.symbols.get(&key.name))
    }
}

/// Requested seeds or a closure: file id to symbol names.
pub type SymbolSet = BTreeMap<String, BTreeSet<String>>;
