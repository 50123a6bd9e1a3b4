use serde::{Deserialize, Serialize};

/// Declares an intent enum. Each variant is tagged `command` or `event`.
macro_rules! intents {
    (@is_event command) => { false };
    (@is_event event) => { true };
    ($(#[$meta:meta])* $name:ident { $($variant:ident($text:literal, $kind:ident)),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),*
                }
            }

            pub fn is_event(self) -> bool {
                match self {
                    $($name::$variant => intents!(@is_event $kind)),*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    ProcessInstance,
    ProcessInstanceCreation,
    Deployment,
    Process,
    Job,
    JobBatch,
    Timer,
    Signal,
    SignalSubscription,
    Incident,
    Error,
    Clock,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::ProcessInstance => "PROCESS_INSTANCE",
            ValueType::ProcessInstanceCreation => "PROCESS_INSTANCE_CREATION",
            ValueType::Deployment => "DEPLOYMENT",
            ValueType::Process => "PROCESS",
            ValueType::Job => "JOB",
            ValueType::JobBatch => "JOB_BATCH",
            ValueType::Timer => "TIMER",
            ValueType::Signal => "SIGNAL",
            ValueType::SignalSubscription => "SIGNAL_SUBSCRIPTION",
            ValueType::Incident => "INCIDENT",
            ValueType::Error => "ERROR",
            ValueType::Clock => "CLOCK",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Command,
    Event,
    CommandRejection,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::Command => write!(f, "COMMAND"),
            RecordType::Event => write!(f, "EVENT"),
            RecordType::CommandRejection => write!(f, "COMMAND_REJECTION"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionType {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    InvalidState,
    Forbidden,
    ProcessingError,
}

impl std::fmt::Display for RejectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionType::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            RejectionType::NotFound => write!(f, "NOT_FOUND"),
            RejectionType::AlreadyExists => write!(f, "ALREADY_EXISTS"),
            RejectionType::InvalidState => write!(f, "INVALID_STATE"),
            RejectionType::Forbidden => write!(f, "FORBIDDEN"),
            RejectionType::ProcessingError => write!(f, "PROCESSING_ERROR"),
        }
    }
}

intents!(ProcessInstanceIntent {
    ActivateElement("ACTIVATE_ELEMENT", command),
    CompleteElement("COMPLETE_ELEMENT", command),
    Cancel("CANCEL", command),
    ElementActivating("ELEMENT_ACTIVATING", event),
    ElementActivated("ELEMENT_ACTIVATED", event),
    ElementCompleting("ELEMENT_COMPLETING", event),
    ElementCompleted("ELEMENT_COMPLETED", event),
    ElementTerminating("ELEMENT_TERMINATING", event),
    ElementTerminated("ELEMENT_TERMINATED", event),
    SequenceFlowTaken("SEQUENCE_FLOW_TAKEN", event),
});

intents!(ProcessInstanceCreationIntent {
    Create("CREATE", command),
    Created("CREATED", event),
});

intents!(DeploymentIntent {
    Create("CREATE", command),
    Created("CREATED", event),
});

intents!(ProcessIntent {
    Created("CREATED", event),
});

intents!(JobIntent {
    Complete("COMPLETE", command),
    Fail("FAIL", command),
    ThrowError("THROW_ERROR", command),
    TimeOut("TIME_OUT", command),
    UpdateRetries("UPDATE_RETRIES", command),
    Created("CREATED", event),
    Completed("COMPLETED", event),
    Failed("FAILED", event),
    ErrorThrown("ERROR_THROWN", event),
    TimedOut("TIMED_OUT", event),
    RetriesUpdated("RETRIES_UPDATED", event),
    Canceled("CANCELED", event),
});

intents!(JobBatchIntent {
    Activate("ACTIVATE", command),
    Activated("ACTIVATED", event),
});

intents!(TimerIntent {
    Trigger("TRIGGER", command),
    Created("CREATED", event),
    Triggered("TRIGGERED", event),
    Canceled("CANCELED", event),
});

intents!(SignalIntent {
    Broadcast("BROADCAST", command),
    Broadcasted("BROADCASTED", event),
});

intents!(SignalSubscriptionIntent {
    Created("CREATED", event),
    Deleted("DELETED", event),
});

intents!(IncidentIntent {
    Resolve("RESOLVE", command),
    Created("CREATED", event),
    Resolved("RESOLVED", event),
});

intents!(ErrorIntent {
    Created("CREATED", event),
});

intents!(ClockIntent {
    Pin("PIN", command),
    Reset("RESET", command),
    Pinned("PINNED", event),
    Resetted("RESETTED", event),
});

/// Intent of a record, tagged with the value type it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intent {
    ProcessInstance(ProcessInstanceIntent),
    ProcessInstanceCreation(ProcessInstanceCreationIntent),
    Deployment(DeploymentIntent),
    Process(ProcessIntent),
    Job(JobIntent),
    JobBatch(JobBatchIntent),
    Timer(TimerIntent),
    Signal(SignalIntent),
    SignalSubscription(SignalSubscriptionIntent),
    Incident(IncidentIntent),
    Error(ErrorIntent),
    Clock(ClockIntent),
}

impl Intent {
    pub fn value_type(self) -> ValueType {
        match self {
            Intent::ProcessInstance(_) => ValueType::ProcessInstance,
            Intent::ProcessInstanceCreation(_) => ValueType::ProcessInstanceCreation,
            Intent::Deployment(_) => ValueType::Deployment,
            Intent::Process(_) => ValueType::Process,
            Intent::Job(_) => ValueType::Job,
            Intent::JobBatch(_) => ValueType::JobBatch,
            Intent::Timer(_) => ValueType::Timer,
            Intent::Signal(_) => ValueType::Signal,
            Intent::SignalSubscription(_) => ValueType::SignalSubscription,
            Intent::Incident(_) => ValueType::Incident,
            Intent::Error(_) => ValueType::Error,
            Intent::Clock(_) => ValueType::Clock,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Intent::ProcessInstance(intent) => intent.name(),
            Intent::ProcessInstanceCreation(intent) => intent.name(),
            Intent::Deployment(intent) => intent.name(),
            Intent::Process(intent) => intent.name(),
            Intent::Job(intent) => intent.name(),
            Intent::JobBatch(intent) => intent.name(),
            Intent::Timer(intent) => intent.name(),
            Intent::Signal(intent) => intent.name(),
            Intent::SignalSubscription(intent) => intent.name(),
            Intent::Incident(intent) => intent.name(),
            Intent::Error(intent) => intent.name(),
            Intent::Clock(intent) => intent.name(),
        }
    }

    pub fn is_event(self) -> bool {
        match self {
            Intent::ProcessInstance(intent) => intent.is_event(),
            Intent::ProcessInstanceCreation(intent) => intent.is_event(),
            Intent::Deployment(intent) => intent.is_event(),
            Intent::Process(intent) => intent.is_event(),
            Intent::Job(intent) => intent.is_event(),
            Intent::JobBatch(intent) => intent.is_event(),
            Intent::Timer(intent) => intent.is_event(),
            Intent::Signal(intent) => intent.is_event(),
            Intent::SignalSubscription(intent) => intent.is_event(),
            Intent::Incident(intent) => intent.is_event(),
            Intent::Error(intent) => intent.is_event(),
            Intent::Clock(intent) => intent.is_event(),
        }
    }

    /// Whether an unexpected processing error for a command with this intent
    /// bans the process instance the command refers to.
    pub fn should_ban_instance_on_error(self) -> bool {
        matches!(
            self,
            Intent::ProcessInstance(
                ProcessInstanceIntent::ActivateElement
                    | ProcessInstanceIntent::CompleteElement
                    | ProcessInstanceIntent::Cancel
            ) | Intent::Job(
                JobIntent::Complete | JobIntent::Fail | JobIntent::ThrowError | JobIntent::TimeOut
            ) | Intent::Timer(TimerIntent::Trigger)
                | Intent::Incident(IncidentIntent::Resolve)
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.value_type(), self.name())
    }
}

macro_rules! intent_from {
    ($($variant:ident($inner:ty)),* $(,)?) => {
        $(impl From<$inner> for Intent {
            fn from(intent: $inner) -> Self {
                Intent::$variant(intent)
            }
        })*
    };
}

intent_from!(
    ProcessInstance(ProcessInstanceIntent),
    ProcessInstanceCreation(ProcessInstanceCreationIntent),
    Deployment(DeploymentIntent),
    Process(ProcessIntent),
    Job(JobIntent),
    JobBatch(JobBatchIntent),
    Timer(TimerIntent),
    Signal(SignalIntent),
    SignalSubscription(SignalSubscriptionIntent),
    Incident(IncidentIntent),
    Error(ErrorIntent),
    Clock(ClockIntent),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_commands_may_ban() {
        let intents: Vec<Intent> = ProcessInstanceIntent::ALL
            .iter()
            .map(|intent| Intent::from(*intent))
            .chain(JobIntent::ALL.iter().map(|intent| Intent::from(*intent)))
            .chain(TimerIntent::ALL.iter().map(|intent| Intent::from(*intent)))
            .collect();
        for intent in intents {
            if intent.should_ban_instance_on_error() {
                assert!(!intent.is_event(), "{}", intent);
            }
        }
    }

    #[test]
    fn test_ban_policy() {
        let activate = Intent::from(ProcessInstanceIntent::ActivateElement);
        assert!(activate.should_ban_instance_on_error());
        assert!(Intent::from(JobIntent::ThrowError).should_ban_instance_on_error());
        assert!(!Intent::from(JobIntent::UpdateRetries).should_ban_instance_on_error());
        assert!(!Intent::from(DeploymentIntent::Create).should_ban_instance_on_error());
        assert!(!Intent::from(ClockIntent::Pin).should_ban_instance_on_error());
    }

    #[test]
    fn test_intent_display() {
        assert_eq!(
            Intent::from(ProcessInstanceIntent::ElementActivated).to_string(),
            "PROCESS_INSTANCE:ELEMENT_ACTIVATED"
        );
    }
}
