use crate::{BackendError, PixelFormat};

/// Picks the hardware surface format out of the formats a decoder offers
/// during its initialization.
///
/// Only an exact match is accepted. Falling back to a host format here would
/// silently turn a hardware session into a software one.
pub fn negotiate(
    candidates: &[PixelFormat],
    desired: PixelFormat,
) -> Result<PixelFormat, BackendError> {
    candidates
        .iter()
        .copied()
        .find(|candidate| *candidate == desired)
        .ok_or_else(|| BackendError::FormatNegotiation {
            wanted: desired,
            offered: candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(
        &[PixelFormat::VideoToolbox, PixelFormat::Nv12, PixelFormat::Yuv420p],
        PixelFormat::VideoToolbox
    )]
    #[case(&[PixelFormat::Yuv420p, PixelFormat::Vaapi], PixelFormat::Vaapi)]
    #[case(&[PixelFormat::Other(200), PixelFormat::Cuda], PixelFormat::Cuda)]
    fn picks_the_desired_format(#[case] candidates: &[PixelFormat], #[case] desired: PixelFormat) {
        assert_eq!(negotiate(candidates, desired).unwrap(), desired);
    }

    #[test]
    fn missing_hardware_format_is_an_error() {
        let err = negotiate(
            &[PixelFormat::Nv12, PixelFormat::Yuv420p],
            PixelFormat::VideoToolbox,
        )
        .unwrap_err();
        match err {
            BackendError::FormatNegotiation { wanted, offered } => {
                assert_eq!(wanted, PixelFormat::VideoToolbox);
                assert_eq!(offered, "nv12, yuv420p");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        assert!(matches!(
            negotiate(&[], PixelFormat::Cuda),
            Err(BackendError::FormatNegotiation { .. })
        ));
    }
}
