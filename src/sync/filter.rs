use crate::cache::CachedRecord;
use crate::remote::RemoteSession;

/// Select the sessions of one tutor from the full remote set.
///
/// Unassigned slots (no student) are dropped. Remote order is preserved.
pub fn filter_for_partition(sessions: &[RemoteSession], key: &str) -> Vec<CachedRecord> {
  sessions
    .iter()
    .filter(|s| s.tutor_id == key && s.student_name.is_some())
    .map(to_cached_record)
    .collect()
}

fn to_cached_record(session: &RemoteSession) -> CachedRecord {
  CachedRecord {
    id: session.id,
    partition_key: session.tutor_id.clone(),
    student_label: session.student_name.clone(),
    course_name: session.course_name.clone(),
    location_name: session.location_name.clone(),
    scheduled_at: session.date_time.clone(),
    cost: session.cost,
    contact_info: session.contact_info.clone(),
  }
}
