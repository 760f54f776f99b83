//! Store key scheme.
//!
//! | key | scope |
//! |---|---|
//! | `sum_day_<day>_<type><id>` | per day |
//! | `max_day_<day>_<type><id>` | per day |
//! | `sum_<type>_<id>` | lifetime |
//! | `count_<type>_<id>` | lifetime |
//! | `avg_<type>_<id>` | lifetime |

use super::hit::ResourceType;

pub fn day_sum_key(day: &str, resource_type: ResourceType, resource_id: u64) -> String {
    format!("sum_day_{day}_{resource_type}{resource_id}")
}

pub fn day_max_key(day: &str, resource_type: ResourceType, resource_id: u64) -> String {
    format!("max_day_{day}_{resource_type}{resource_id}")
}

pub fn sum_key(resource_type: ResourceType, resource_id: u64) -> String {
    format!("sum_{resource_type}_{resource_id}")
}

pub fn count_key(resource_type: ResourceType, resource_id: u64) -> String {
    format!("count_{resource_type}_{resource_id}")
}

pub fn avg_key(resource_type: ResourceType, resource_id: u64) -> String {
    format!("avg_{resource_type}_{resource_id}")
}

/// Lock key covering every lifetime key of one resource.
pub fn resource_lock_key(resource_type: ResourceType, resource_id: u64) -> String {
    format!("{resource_type}:{resource_id}")
}
