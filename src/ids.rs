use blake3::Hasher;

/// Prefix of the textual placeholder used as `target_id` on edges that
/// have not been bound to a concrete node yet.
pub const REF_PREFIX: &str = "ref:";

/// Hex characters kept from the blake3 digest. 64 bits is collision
/// tolerant at repository scale while keeping ids short in tool output.
const ID_HEX_LEN: usize = 16;

/// Compute a node identity from the fields that define it. Re-parsing the
/// same file contents reproduces the same id for every node.
pub fn node_id(file_path: &str, node_type: &str, name: &str, line_start: i64) -> String {
    let mut hasher = Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"\x00");
    hasher.update(node_type.as_bytes());
    hasher.update(b"\x00");
    hasher.update(name.as_bytes());
    hasher.update(b"\x00");
    hasher.update(line_start.to_string().as_bytes());
    let hash = hasher.finalize();
    hash.to_hex()[..ID_HEX_LEN].to_string()
}

/// Edge identity over `(source, target, type)`. The target may be a
/// `ref:` placeholder; the id is not recomputed when the edge resolves.
pub fn edge_id(source_id: &str, target_id: &str, edge_type: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(target_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(edge_type.as_bytes());
    let hash = hasher.finalize();
    hash.to_hex()[..ID_HEX_LEN].to_string()
}

/// Category of an unresolved reference target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Class,
    Interface,
    Function,
    Method,
    Module,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Class => "class",
            RefKind::Interface => "interface",
            RefKind::Function => "function",
            RefKind::Method => "method",
            RefKind::Module => "module",
        }
    }
}

pub fn ref_target(kind: RefKind, name: &str) -> String {
    format!("{REF_PREFIX}{}:{name}", kind.as_str())
}

pub fn is_placeholder(target_id: &str) -> bool {
    target_id.starts_with(REF_PREFIX)
}
