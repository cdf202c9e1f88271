//! AWS error classification
//!
//! Uses `ProvideErrorMetadata::code()` instead of string matching on the
//! Debug format. The only classification this crate needs is "does this
//! describe error mean the AMI is gone": cleanup treats a vanished AMI as
//! success, and anything else as fatal.

use aws_sdk_ec2::error::ProvideErrorMetadata;

/// Error codes meaning an AMI id does not resolve to a live image
pub const IMAGE_NOT_FOUND_CODES: &[&str] = &[
    "InvalidAMIID.NotFound",
    "InvalidAMIID.Malformed",
    "InvalidAMIID.Unavailable",
];

/// Check whether an EC2 error means "this AMI does not exist".
pub fn is_image_not_found<E>(err: &E) -> bool
where
    E: ProvideErrorMetadata,
{
    matches!(err.code(), Some(code) if IMAGE_NOT_FOUND_CODES.contains(&code))
}
