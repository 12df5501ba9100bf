use crate::state::Role;

/// Derive the shared identifier for a two-party conversation. Both sides must
/// compute the same value independently; the result doubles as the push
/// channel's room topic.
///
/// Farmer/pathologist pairs are anchored on the farmer's id: every
/// pathologist consulting the same farmer lands in one room keyed by that
/// farmer, no matter which side derives it. That is the deployed backend's
/// topic scheme — changing it would move clients onto a different wire-level
/// topic and break message delivery against the live service, so it is kept
/// verbatim even though it buckets all pathologists of one farmer together.
///
/// Every other pairing falls back to an order-independent id built from the
/// lexicographically sorted participant ids.
pub fn room_id(self_id: &str, self_role: Role, other_id: &str, other_role: Role) -> String {
    match (self_role, other_role) {
        (Role::Farmer, Role::PlantPathologist) => format!("pathologist_farmer_{self_id}"),
        (Role::PlantPathologist, Role::Farmer) => format!("pathologist_farmer_{other_id}"),
        _ => {
            let (low, high) = if self_id <= other_id {
                (self_id, other_id)
            } else {
                (other_id, self_id)
            };
            format!("chat_{low}_{high}")
        }
    }
}
