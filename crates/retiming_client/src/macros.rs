//! Pose accessor macros
//!
//! Every query boundary exposes the same five representations for each of
//! the static, global and local transforms. The accessors are generated from
//! a table instead of written out fifteen times.

/// Define representation accessors for one `PoseKind`
///
/// # Usage
/// ```ignore
/// impl RetimingClient {
///     define_pose_accessors!(PoseKind::Global => {
///         segment_global_translation -> [f64; 3] = translation,
///         segment_global_rotation_quaternion -> [f64; 4] = quaternion,
///     });
/// }
/// ```
macro_rules! define_pose_accessors {
    ($kind:expr => { $($accessor:ident -> $value:ty = $method:ident),+ $(,)? }) => {
        $(
            #[doc = concat!(
                "`Transform::", stringify!($method), "` of the segment's `",
                stringify!($kind), "` transform in the current frame"
            )]
            pub fn $accessor(&self, subject: &str, segment: &str) -> $crate::error::Result<$value> {
                self.segment_transform(subject, segment, $kind)
                    .map(|transform| transform.$method())
            }
        )+
    };
}
