//! Protocol message definitions.

/// Which plane a frame is dispatched to at the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FrameType {
    /// Execution plane: a queued operation.
    Request = 0,
    /// Control plane: service management (suspend/resume/status/drain).
    Service = 1,
    /// Control plane: management of one target request (status/stop).
    Management = 2,
}

/// The kind of a queued (execution-plane) operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum QueuedType {
    /// Copy a chunk replica from another worker.
    Replicate = 0,
    /// Delete a chunk replica.
    Delete = 1,
    /// Locate one chunk replica.
    Find = 2,
    /// Locate all replicas of a database.
    FindAll = 3,
    /// Liveness probe; echoes its payload.
    Echo = 4,
    /// Execute per-chunk SQL and stream back rows.
    Sql = 5,
}

/// The kind of a management-plane operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ManagementType {
    /// Report the state of the target request.
    Status = 0,
    /// Stop the target request.
    Stop = 1,
}

/// Worker-side disposition of a replica, reported by FIND / FIND_ALL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReplicaStatus {
    /// No trace of the replica.
    NotFound = 0,
    /// Some files exist but the replica is unusable.
    Incomplete = 1,
    /// All files present and verified.
    Complete = 2,
}

/// Worker service-management actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ServiceAction {
    /// Report service state.
    Status = 0,
    /// Stop accepting new requests, keep running queued ones.
    Suspend = 1,
    /// Resume accepting requests.
    Resume = 2,
    /// Finish queued requests, then stop.
    Drain = 3,
}

/// The frame header, present on every message in both directions.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FrameHeader {
    /// Request id, unique per czar; responses echo it.
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Dispatch plane.
    #[prost(enumeration = "FrameType", tag = "2")]
    pub frame_type: i32,
    /// Operation kind for execution-plane frames.
    #[prost(enumeration = "QueuedType", tag = "3")]
    pub queued_type: i32,
    /// Operation kind for management-plane frames.
    #[prost(enumeration = "ManagementType", tag = "4")]
    pub management_type: i32,
    /// Length in bytes of the payload following the header.
    #[prost(uint32, tag = "5")]
    pub payload_size: u32,
}

impl FrameHeader {
    /// A header for an execution-plane frame.
    pub fn queued(id: u64, queued_type: QueuedType) -> Self {
        Self {
            id,
            frame_type: FrameType::Request as i32,
            queued_type: queued_type as i32,
            management_type: 0,
            payload_size: 0,
        }
    }

    /// A header for a management-plane frame.
    pub fn management(id: u64, management_type: ManagementType) -> Self {
        Self {
            id,
            frame_type: FrameType::Management as i32,
            queued_type: 0,
            management_type: management_type as i32,
            payload_size: 0,
        }
    }

    /// A header for a service-plane frame.
    pub fn service(id: u64) -> Self {
        Self {
            id,
            frame_type: FrameType::Service as i32,
            queued_type: 0,
            management_type: 0,
            payload_size: 0,
        }
    }
}

/// Per-chunk SQL execution request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SqlRequest {
    /// Job id within the user query.
    #[prost(uint64, tag = "1")]
    pub job_id: u64,
    /// Attempt number of this dispatch, starting at 0.
    #[prost(uint32, tag = "2")]
    pub attempt_count: u32,
    /// Database the queries run against.
    #[prost(string, tag = "3")]
    pub db: String,
    /// The chunk the queries cover.
    #[prost(int32, tag = "4")]
    pub chunk_id: i32,
    /// Sub-chunk ids, empty for plain chunk queries.
    #[prost(int32, repeated, tag = "5")]
    pub sub_chunk_ids: Vec<i32>,
    /// The SQL strings to execute, in order.
    #[prost(string, repeated, tag = "6")]
    pub queries: Vec<String>,
}

/// Liveness probe payload; workers echo `data` back.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoRequest {
    /// Opaque bytes to echo.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

/// Locate one chunk replica.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FindRequest {
    /// Database of the replica.
    #[prost(string, tag = "1")]
    pub database: String,
    /// Chunk id of the replica.
    #[prost(int32, tag = "2")]
    pub chunk_id: i32,
}

/// Locate all replicas of a database on the worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FindAllRequest {
    /// Database to enumerate.
    #[prost(string, tag = "1")]
    pub database: String,
}

/// Copy a chunk replica from another worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReplicateRequest {
    /// Database of the replica.
    #[prost(string, tag = "1")]
    pub database: String,
    /// Chunk id of the replica.
    #[prost(int32, tag = "2")]
    pub chunk_id: i32,
    /// Worker to copy from.
    #[prost(string, tag = "3")]
    pub source_worker: String,
}

/// Delete a chunk replica.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    /// Database of the replica.
    #[prost(string, tag = "1")]
    pub database: String,
    /// Chunk id of the replica.
    #[prost(int32, tag = "2")]
    pub chunk_id: i32,
}

/// Management-plane payload: act on one earlier request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ManagementRequest {
    /// The id of the request being targeted.
    #[prost(uint64, tag = "1")]
    pub target_id: u64,
}

/// Service-plane payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceRequest {
    /// The requested action.
    #[prost(enumeration = "ServiceAction", tag = "1")]
    pub action: i32,
}

/// One column of a result row set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnDesc {
    /// Column name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// SQL type, as the worker's database reported it (e.g. `BIGINT`).
    #[prost(string, tag = "2")]
    pub sql_type: String,
}

/// One cell of a result row.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cell {
    /// SQL NULL marker; `value` is empty when set.
    #[prost(bool, tag = "1")]
    pub null: bool,
    /// The cell bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// One result row.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Row {
    /// Cells in column order.
    #[prost(message, repeated, tag = "1")]
    pub cells: Vec<Cell>,
}

/// Wall-clock timestamps of one request's life at the worker, in
/// nanoseconds since the unix epoch.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PerformanceRecord {
    /// When the worker queued the request.
    #[prost(int64, tag = "1")]
    pub queued_ns: i64,
    /// When execution started.
    #[prost(int64, tag = "2")]
    pub started_ns: i64,
    /// When execution finished.
    #[prost(int64, tag = "3")]
    pub finished_ns: i64,
}

/// The result payload of a SQL request response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResultPayload {
    /// Job id echoed from the request.
    #[prost(uint64, tag = "1")]
    pub job_id: u64,
    /// Attempt count echoed from the request.
    #[prost(uint32, tag = "2")]
    pub attempt_count: u32,
    /// Number of rows in `rows`.
    #[prost(uint32, tag = "3")]
    pub row_count: u32,
    /// Result schema.
    #[prost(message, repeated, tag = "4")]
    pub columns: Vec<ColumnDesc>,
    /// Result rows.
    #[prost(message, repeated, tag = "5")]
    pub rows: Vec<Row>,
    /// Worker-side error code, if the request failed.
    #[prost(uint32, optional, tag = "6")]
    pub errorcode: Option<u32>,
    /// Worker-side error message, if the request failed.
    #[prost(string, optional, tag = "7")]
    pub errormsg: Option<String>,
    /// Set when the worker spilled the result and more frames follow.
    #[prost(bool, optional, tag = "8")]
    pub largeresult: Option<bool>,
    /// Request timing at the worker.
    #[prost(message, optional, tag = "9")]
    pub performance: Option<PerformanceRecord>,
}

impl ResultPayload {
    /// True if the worker reported a failure.
    pub fn has_error(&self) -> bool {
        self.errorcode.is_some() || self.errormsg.is_some()
    }
}

/// One file of a replica.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileInfo {
    /// File name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Size in bytes.
    #[prost(uint64, tag = "2")]
    pub size: u64,
    /// Content checksum.
    #[prost(string, tag = "3")]
    pub checksum: String,
}

/// Response payload of FIND / FIND_ALL / REPLICATE operations.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReplicaInfo {
    /// Replica disposition.
    #[prost(enumeration = "ReplicaStatus", tag = "1")]
    pub status: i32,
    /// The worker reporting.
    #[prost(string, tag = "2")]
    pub worker: String,
    /// Database of the replica.
    #[prost(string, tag = "3")]
    pub database: String,
    /// Chunk id of the replica.
    #[prost(int32, tag = "4")]
    pub chunk_id: i32,
    /// The replica's files.
    #[prost(message, repeated, tag = "5")]
    pub files: Vec<FileInfo>,
}

/// Response payload of service-plane requests.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceState {
    /// Human-readable service state, e.g. `RUNNING`.
    #[prost(string, tag = "1")]
    pub state: String,
    /// Requests waiting in the worker queue.
    #[prost(uint32, tag = "2")]
    pub queued: u32,
    /// Requests currently executing.
    #[prost(uint32, tag = "3")]
    pub in_progress: u32,
}
