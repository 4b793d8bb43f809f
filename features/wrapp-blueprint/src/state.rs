use std::fmt::Display;

/// The states of a module container, in the order they are normally passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Unknown,
    WaitForNamespaceHandlers,
    Populated,
    WaitForInitialReferences,
    InitialReferencesSatisfied,
    WaitForInitialReferences2,
    InitialReferencesSatisfied2,
    WaitForTrigger,
    Create,
    Created,
    Failed,
    Destroyed,
}
impl Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// What the driver knows when it leaves a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inputs {
    pub handlers_available: bool,
    pub dependencies_satisfied: bool,
    pub wait_for_dependencies: bool,
    pub lazy_activation: bool,
    pub activation_requested: bool,
}
impl Default for Inputs {
    fn default() -> Self {
        Self {
            handlers_available: false,
            dependencies_satisfied: false,
            wait_for_dependencies: true,
            lazy_activation: false,
            activation_requested: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Goto(LifecycleState),
    /// Stay and return until an external event resumes the driver
    Suspend,
    /// Nothing left to do
    Halt,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Created | LifecycleState::Failed | LifecycleState::Destroyed
        )
    }

    /// States waiting for satisfiable dependencies
    pub fn is_waiting_for_references(&self) -> bool {
        matches!(
            self,
            LifecycleState::WaitForInitialReferences | LifecycleState::WaitForInitialReferences2
        )
    }

    /// Where the driver goes after performing the work of this state
    pub fn next(&self, inputs: &Inputs) -> Transition {
        use LifecycleState::*;

        let proceed = inputs.dependencies_satisfied || !inputs.wait_for_dependencies;
        match self {
            Unknown => Transition::Goto(WaitForNamespaceHandlers),
            WaitForNamespaceHandlers if inputs.handlers_available => Transition::Goto(Populated),
            WaitForNamespaceHandlers => Transition::Suspend,
            Populated if proceed => Transition::Goto(InitialReferencesSatisfied),
            Populated => Transition::Goto(WaitForInitialReferences),
            WaitForInitialReferences if proceed => Transition::Goto(InitialReferencesSatisfied),
            WaitForInitialReferences => Transition::Suspend,
            InitialReferencesSatisfied if proceed => Transition::Goto(InitialReferencesSatisfied2),
            InitialReferencesSatisfied => Transition::Goto(WaitForInitialReferences2),
            WaitForInitialReferences2 if proceed => Transition::Goto(InitialReferencesSatisfied2),
            WaitForInitialReferences2 => Transition::Suspend,
            InitialReferencesSatisfied2 if inputs.lazy_activation => Transition::Goto(WaitForTrigger),
            InitialReferencesSatisfied2 => Transition::Goto(Create),
            WaitForTrigger if inputs.activation_requested => Transition::Goto(Create),
            WaitForTrigger => Transition::Suspend,
            Create => Transition::Goto(Created),
            Created | Failed | Destroyed => Transition::Halt,
        }
    }
}
