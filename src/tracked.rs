//! Self-description contract for tracked target types.

use crate::config::TrackingConfiguration;

/// Capability trait for types that participate in tracking.
///
/// Both methods default to doing nothing, so `impl Tracked for MyType {}`
/// is enough for types configured entirely through
/// [`Tracker::configure`](crate::Tracker::configure).
///
/// `describe` is the type-level self-description: it runs once, when the
/// registry first builds a configuration for the type from scratch. The
/// tracker's name is passed in so a type can declare different property
/// subsets for different trackers (one engine tracking per-user data,
/// another per-machine data).
///
/// `configure_tracking` is the per-instance customization point: it runs at
/// track time against a clone of the type configuration. Return `true` to
/// keep the customized clone as an instance-private configuration; when it
/// returns `false` the shared type template is used as-is. The template is
/// never mutated by this path.
pub trait Tracked: Sized + 'static {
    fn describe(_config: &mut TrackingConfiguration<Self>, _tracker_name: Option<&str>) {}

    fn configure_tracking(&self, _config: &mut TrackingConfiguration<Self>) -> bool {
        false
    }
}
