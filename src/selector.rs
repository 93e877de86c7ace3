use tracing::{info, warn};

use crate::{BackendError, DecoderCatalog, DecoderChoice, SelectorConfig};

/// Chooses between the hardware decoder named by `config` and the codec's
/// software decoder.
///
/// The hardware device context created here is only a probe; the decode
/// session creates its own when it opens.
pub fn select_decoder<C>(
    catalog: &C,
    config: &SelectorConfig,
) -> Result<DecoderChoice, BackendError>
where
    C: DecoderCatalog + ?Sized,
{
    let mut fallback_reason = None;

    if config.software_only {
        info!("Hardware decoding disabled, skipping {}", config.device);
    } else {
        let wanted = config.hardware_decoder_name();
        match catalog.find_decoder_by_name(&wanted) {
            Some(name) => match catalog.probe_hw_device(config.device) {
                Ok(()) => {
                    info!("Successfully initialized {} decoder {name}", config.device);
                    return Ok(DecoderChoice::hardware(name, config.device));
                }
                Err(err) => {
                    warn!(
                        "Found {name} decoder but failed to initialize {} hardware context: {err}",
                        config.device
                    );
                    fallback_reason = Some(err);
                }
            },
            None => {
                info!("Hardware decoder {wanted} not available");
            }
        }
    }

    if config.require_hardware {
        return Err(fallback_reason.unwrap_or(BackendError::NoDecoder(config.codec)));
    }

    match catalog.find_decoder(config.codec) {
        Some(name) => {
            info!("Using software {} decoder: {name}", config.codec);
            Ok(DecoderChoice::software(name))
        }
        None => {
            warn!("No {} decoder found", config.codec);
            Err(BackendError::NoDecoder(config.codec))
        }
    }
}
