mod frame;
mod sky;

pub use frame::{
    cross, dot, mount_zenith, platform_to_horizon, pole_axis, rotate_about, tangent_basis,
    TangentBasis, Vec3,
};
pub use sky::{
    equatorial_to_horizontal, greenwich_sidereal_time, horizontal_from_vector,
    horizontal_to_equatorial, hour_angle_hours, local_sidereal_time, norm, norm_ra,
    unit_vector, Site, SkyPosition, SIDEREAL_DAY_SECONDS, SIDEREAL_DEGREES_PER_SECOND,
};
