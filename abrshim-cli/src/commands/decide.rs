//! Decide command - show what the BB fallback picks for a buffer level.

use abrshim::abr::BufferBased;
use abrshim::config::ConfigFile;
use abrshim::segment::{now_millis, Decision};

use crate::error::CliError;

/// Run the decide command.
pub fn run(config: &ConfigFile, buffer_ms: f64, index: u64) -> Result<(), CliError> {
    if !buffer_ms.is_finite() || buffer_ms < 0.0 {
        return Err(CliError::Config(format!(
            "Buffer level must be a non-negative number of milliseconds, got {}",
            buffer_ms
        )));
    }

    let bb = BufferBased::new(config.ladder()?, config.bb_config());
    let decision = bb.decide_for_buffer(buffer_ms, index, now_millis());

    print!("{}", render(&bb, buffer_ms, &decision));
    Ok(())
}

fn render(bb: &BufferBased, buffer_ms: f64, decision: &Decision) -> String {
    let ladder = bb.ladder();
    let bitrate = ladder.bitrate(decision.quality).unwrap_or_default();
    let config = bb.config();

    format!(
        "Buffer level:   {:.0} ms (reservoir {:.0} ms, cushion {:.0} ms)\n\
         Target bitrate: {:.0} kbps\n\
         Quality:        {} of {} ({} kbps)\n\
         Segment:        {}\n",
        buffer_ms,
        config.reservoir_ms,
        config.cushion_ms,
        bb.target_bitrate(buffer_ms),
        decision.quality,
        ladder.top_quality(),
        bitrate,
        decision.index,
    )
}
