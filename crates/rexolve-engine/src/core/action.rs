/// Discrete input the runner receives once per frame.
///
/// The discriminants are the output indices of the policy network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::IsVariant)]
pub enum Action {
    #[display("jump")]
    Jump = 0,
    #[display("duck")]
    Duck = 1,
    #[display("run")]
    Run = 2,
}

impl Action {
    pub const LEN: usize = 3;
    pub const ALL: [Self; Self::LEN] = [Self::Jump, Self::Duck, Self::Run];

    /// Maps a policy output index back to an action.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}
