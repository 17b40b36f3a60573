use std::sync::Arc;

/// Identifier of a registered cell state.
///
/// Id 0 is the reserved empty sentinel; the save format packs ids into a
/// single byte, so a table holds at most 256 states including empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub u8);

impl StateId {
    /// The "no cell here" sentinel.
    pub const EMPTY: StateId = StateId(0);

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Immutable structural descriptor of a cell material.
///
/// Rendering, audio, and gameplay parameters are external config; the
/// engine only cares about these four fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    pub name: String,
    /// Refuses `empty()` unless the caller forces it.
    pub permanent: bool,
    /// Anchors structure: island searches stop when they reach one.
    pub supported: bool,
    /// Refuses `empty()` unless the caller passes the hard-force flag.
    pub hard: bool,
    pub density: f32,
}

impl CellState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permanent: false,
            supported: false,
            hard: false,
            density: 1.0,
        }
    }

    pub fn permanent(mut self, yes: bool) -> Self {
        self.permanent = yes;
        self
    }

    pub fn supported(mut self, yes: bool) -> Self {
        self.supported = yes;
        self
    }

    pub fn hard(mut self, yes: bool) -> Self {
        self.hard = yes;
        self
    }

    pub fn density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }
}

/// Registry of cell states, indexed by `StateId`.
///
/// Built once at startup, then shared immutably (`Arc`) by every volume
/// that speaks the same material palette. Slot 0 is always the empty
/// sentinel.
pub struct StateTable {
    states: Vec<CellState>,
}

impl StateTable {
    pub fn new() -> Self {
        Self {
            states: vec![CellState {
                name: "empty".into(),
                permanent: false,
                supported: false,
                hard: false,
                density: 0.0,
            }],
        }
    }

    /// Register a state and return its id. Ids are assigned in
    /// registration order starting at 1.
    pub fn register(&mut self, state: CellState) -> StateId {
        assert!(self.states.len() <= u8::MAX as usize, "state table full");
        let id = StateId(self.states.len() as u8);
        self.states.push(state);
        id
    }

    pub fn get(&self, id: StateId) -> Option<&CellState> {
        self.states.get(id.0 as usize)
    }

    /// Whether `id` names a registered, non-empty state.
    pub fn contains(&self, id: StateId) -> bool {
        !id.is_empty() && (id.0 as usize) < self.states.len()
    }

    /// Look up a state id by name. Linear scan; tables are tiny.
    pub fn id_of(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|s| s.name == name)
            .map(|i| StateId(i as u8))
    }

    pub fn is_permanent(&self, id: StateId) -> bool {
        self.get(id).is_some_and(|s| s.permanent)
    }

    pub fn is_supported(&self, id: StateId) -> bool {
        self.get(id).is_some_and(|s| s.supported)
    }

    pub fn is_hard(&self, id: StateId) -> bool {
        self.get(id).is_some_and(|s| s.hard)
    }

    /// Number of registered states, the empty sentinel included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn into_shared(self) -> Arc<StateTable> {
        Arc::new(self)
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}
