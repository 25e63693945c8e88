use std::collections::HashMap;
use std::future::Future;

use super::types::{LaunchSession, SessionData, SessionUpdate};
use crate::progress::{ProgressReceipt, ProgressRecord, Unit, UnitContent, UnitProgress};
use crate::types::SessionId;

/// Server-side session persistence.
///
/// Sessions are keyed by the opaque [`SessionId`] carried in the encrypted
/// session cookie. Expired sessions must behave as absent.
///
/// [`MemorySessionStore`](crate::session::MemorySessionStore) is the bundled
/// in-process implementation.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for RedisSessions {
///     async fn get(&self, id: &SessionId) -> Result<Option<SessionData>, ...> {
///         self.load(id.as_str()).await
///     }
///     // ...
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Load a live session.
    fn get(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<SessionData>, Box<dyn std::error::Error + Send + Sync>>>
           + Send;

    /// Apply a partial update, creating the session if needed.
    fn set(
        &self,
        session_id: &SessionId,
        update: SessionUpdate,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;

    /// Remove and return the pending launch in one step.
    ///
    /// A second call for the same launch must return `None`.
    fn take_launch(
        &self,
        session_id: &SessionId,
    ) -> impl Future<
        Output = Result<Option<LaunchSession>, Box<dyn std::error::Error + Send + Sync>>,
    > + Send;

    /// Delete a session (logout, rotation).
    fn destroy(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>> + Send;
}

/// Read/write access to learning content and progress records.
///
/// Failures must be reported as errors, never as empty results: an
/// unavailable store is not "no progress".
pub trait ProgressGateway: Send + Sync + 'static {
    /// Units of a course, in any order.
    fn course_units(
        &self,
        course_id: &str,
    ) -> impl Future<Output = Result<Vec<Unit>, Box<dyn std::error::Error + Send + Sync>>> + Send;

    /// Progress per unit id for one student, all records of a unit folded together.
    fn student_progress(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> impl Future<
        Output = Result<HashMap<String, UnitProgress>, Box<dyn std::error::Error + Send + Sync>>,
    > + Send;

    /// Persist a progress record.
    fn record_progress(
        &self,
        record: ProgressRecord,
    ) -> impl Future<Output = Result<ProgressReceipt, Box<dyn std::error::Error + Send + Sync>>>
           + Send;

    /// A unit with its content blocks, or `None` if it does not exist.
    fn unit_content(
        &self,
        unit_id: &str,
    ) -> impl Future<
        Output = Result<Option<UnitContent>, Box<dyn std::error::Error + Send + Sync>>,
    > + Send;
}
