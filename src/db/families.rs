use serde::{Deserialize, Serialize};

/// Logical tables of the partition state. The discriminant is the two-byte
/// prefix of every key stored in the family and must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum ColumnFamilies {
    Default = 0,
    KeyGenerator = 1,
    LastProcessedPosition = 2,

    ElementInstanceKey = 10,
    ElementInstanceParentChild = 11,

    ProcessCacheByKey = 20,
    ProcessCacheByIdAndVersion = 21,
    ProcessLatestVersion = 22,

    Jobs = 30,
    JobStates = 31,
    JobActivatable = 32,
    JobDeadlines = 33,

    Timers = 40,
    TimerDueDates = 41,

    SignalSubscriptionByName = 50,
    SignalSubscriptionByKey = 51,

    Incidents = 60,
    IncidentByElementInstance = 61,
    IncidentByJob = 62,

    BannedInstance = 70,
    ClockModification = 80,

    DeprecatedBlacklist = 900,
    DeprecatedProcessCache = 901,
}

impl ColumnFamilies {
    pub const ALL: [ColumnFamilies; 23] = [
        ColumnFamilies::Default,
        ColumnFamilies::KeyGenerator,
        ColumnFamilies::LastProcessedPosition,
        ColumnFamilies::ElementInstanceKey,
        ColumnFamilies::ElementInstanceParentChild,
        ColumnFamilies::ProcessCacheByKey,
        ColumnFamilies::ProcessCacheByIdAndVersion,
        ColumnFamilies::ProcessLatestVersion,
        ColumnFamilies::Jobs,
        ColumnFamilies::JobStates,
        ColumnFamilies::JobActivatable,
        ColumnFamilies::JobDeadlines,
        ColumnFamilies::Timers,
        ColumnFamilies::TimerDueDates,
        ColumnFamilies::SignalSubscriptionByName,
        ColumnFamilies::SignalSubscriptionByKey,
        ColumnFamilies::Incidents,
        ColumnFamilies::IncidentByElementInstance,
        ColumnFamilies::IncidentByJob,
        ColumnFamilies::BannedInstance,
        ColumnFamilies::ClockModification,
        ColumnFamilies::DeprecatedBlacklist,
        ColumnFamilies::DeprecatedProcessCache,
    ];

    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn prefix(self) -> [u8; 2] {
        self.id().to_be_bytes()
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|family| family.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnFamilies::Default => "DEFAULT",
            ColumnFamilies::KeyGenerator => "KEY",
            ColumnFamilies::LastProcessedPosition => "LAST_PROCESSED_POSITION",
            ColumnFamilies::ElementInstanceKey => "ELEMENT_INSTANCE_KEY",
            ColumnFamilies::ElementInstanceParentChild => "ELEMENT_INSTANCE_PARENT_CHILD",
            ColumnFamilies::ProcessCacheByKey => "PROCESS_CACHE",
            ColumnFamilies::ProcessCacheByIdAndVersion => "PROCESS_CACHE_BY_ID_AND_VERSION",
            ColumnFamilies::ProcessLatestVersion => "PROCESS_VERSION",
            ColumnFamilies::Jobs => "JOBS",
            ColumnFamilies::JobStates => "JOB_STATES",
            ColumnFamilies::JobActivatable => "JOB_ACTIVATABLE",
            ColumnFamilies::JobDeadlines => "JOB_DEADLINES",
            ColumnFamilies::Timers => "TIMERS",
            ColumnFamilies::TimerDueDates => "TIMER_DUE_DATES",
            ColumnFamilies::SignalSubscriptionByName => "SIGNAL_SUBSCRIPTION_BY_NAME_AND_KEY",
            ColumnFamilies::SignalSubscriptionByKey => "SIGNAL_SUBSCRIPTION_BY_KEY_AND_NAME",
            ColumnFamilies::Incidents => "INCIDENTS",
            ColumnFamilies::IncidentByElementInstance => "INCIDENT_PROCESS_INSTANCES",
            ColumnFamilies::IncidentByJob => "INCIDENT_JOBS",
            ColumnFamilies::BannedInstance => "BANNED_INSTANCE",
            ColumnFamilies::ClockModification => "CLOCK",
            ColumnFamilies::DeprecatedBlacklist => "DEPRECATED_BLACKLIST",
            ColumnFamilies::DeprecatedProcessCache => "DEPRECATED_PROCESS_CACHE",
        }
    }
}

impl std::fmt::Display for ColumnFamilies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
