// Module naming follows project convention (MPMC = Multi-Producer Multi-Consumer)
pub mod error;

#[allow(non_snake_case)]
pub mod MPMC {
    pub mod Buffer {
        pub mod Buffer;
        pub mod Buffer_impl;
        pub use Buffer::{BoundedQueue, ResizeDirection, ResizeState}; // re-export for stable path
    }
    pub mod Structs {
        pub mod Message_Structs;
        pub use Message_Structs::{Message, DATA_TYPE, MARKER_TYPE, MAX_PAYLOAD}; // re-export for stable path
    }
    pub mod Policy {
        pub mod contract;
        pub mod monitor;
        pub mod permit;
        pub use contract::{Discipline, SlotAcquire, SyncPolicy, WAKE_SLACK};
        pub use monitor::MonitorPolicy;
        pub use permit::PermitPolicy;
    }

    pub mod builder;
    pub mod pool;
    pub mod resize;
    pub mod session;

    mod consumer;
    mod debug;
    mod producer;

    pub use builder::{SessionBuilder, SessionConfig};
    pub use pool::{Liveness, Role, WorkerPool, WorkerReport};
    pub use resize::{ResizeCoordinator, ResizeOutcome};
    pub use session::{Session, SessionSummary, Status};
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod futex;
    pub mod permit;
    pub use permit::CountingPermit;
}
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use error::{PoolError, QueueError};
pub use MPMC::Policy::Discipline;
pub use MPMC::{Session, SessionBuilder};
