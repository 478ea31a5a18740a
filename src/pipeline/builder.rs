//! Graph descriptor builder: stream parameters in, stage sequence out.

use rand::Rng;

use super::{GraphDescription, PropValue, SampleFormat, Stage, StageKind};
use crate::params::{Codec, StreamParameters};
use crate::{QOS_DSCP, RTP_PAYLOAD_TYPE};

/// Frequency range for the randomized fallback tone, in Hz.
const FALLBACK_FREQ_RANGE: std::ops::Range<i64> = 240..1000;

/// Build the pipeline description for the given parameters.
///
/// Total for validated parameters. The only side effect is a single
/// randomness draw when no explicit source tuning is supplied, so repeated
/// runs are audibly distinguishable.
pub fn build(params: &StreamParameters) -> GraphDescription {
    build_with_rng(params, &mut rand::thread_rng())
}

/// [`build`] with a caller-supplied random source.
///
/// With a seeded generator the result is fully deterministic, which is what
/// tests use to pin down the frequency fallback.
pub fn build_with_rng<R: Rng>(params: &StreamParameters, rng: &mut R) -> GraphDescription {
    let (format, payloader) = match params.codec {
        Codec::L16 => (SampleFormat::S16Be, StageKind::RtpL16Pay),
        Codec::L24 => (SampleFormat::S24Be, StageKind::RtpL24Pay),
    };

    // Packetization window in nanoseconds, truncated. Used as both the
    // minimum and the maximum so the payloader emits a fixed packet
    // duration instead of adapting.
    let ptime_ns = (params.packet_time_ms * 1_000_000.0) as i64;

    let mut source = Stage::new(StageKind::TestSource);
    let tuning = params.source_params.trim();
    if tuning.is_empty() {
        source = source.with("freq", rng.gen_range(FALLBACK_FREQ_RANGE));
    } else {
        for (name, value) in parse_source_params(tuning) {
            source = source.with(&name, value);
        }
    }

    let rate = params.sample_rate.as_hz() as i64;
    let channels = params.channels as i64;

    // Downstream stages restate what upstream stages fixed: the rtp-caps
    // clock rate and channel count must match the raw caps, and the
    // payloader variant must match the asserted sample format.
    GraphDescription::new(vec![
        source,
        Stage::new(StageKind::AudioConvert),
        Stage::new(StageKind::FormatCaps)
            .with("format", format.as_caps())
            .with("channels", channels)
            .with("rate", rate),
        Stage::new(payloader)
            .with("min-ptime", ptime_ns)
            .with("max-ptime", ptime_ns),
        Stage::new(StageKind::RtpCaps)
            .with("clock-rate", rate)
            .with("channels", channels)
            .with("payload", RTP_PAYLOAD_TYPE as i64),
        Stage::new(StageKind::UdpSink)
            .with("host", params.multicast_address.to_string())
            .with("port", params.udp_port as i64)
            .with("qos", true)
            .with("qos-dscp", QOS_DSCP as i64)
            .with("multicast-iface", params.multicast_iface.as_str()),
    ])
}

/// Split a free-form tuning string into properties, verbatim.
fn parse_source_params(raw: &str) -> Vec<(String, PropValue)> {
    raw.split_whitespace()
        .map(|token| match token.split_once('=') {
            Some((name, value)) => (name.to_string(), PropValue::Str(value.to_string())),
            None => (token.to_string(), PropValue::Str(String::new())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::params::SampleRate;

    fn params() -> StreamParameters {
        StreamParameters::default()
    }

    #[test]
    fn stage_order_is_fixed() {
        let description = build(&params());
        let kinds: Vec<StageKind> = description.stages().iter().map(Stage::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::TestSource,
                StageKind::AudioConvert,
                StageKind::FormatCaps,
                StageKind::RtpL24Pay,
                StageKind::RtpCaps,
                StageKind::UdpSink,
            ]
        );
    }

    #[test]
    fn packet_time_converts_to_nanoseconds() {
        for (ms, ns) in [(1.0, 1_000_000i64), (0.5, 500_000), (0.125, 125_000)] {
            let description = build(&StreamParameters {
                packet_time_ms: ms,
                ..params()
            });
            let payloader = description.stage(StageKind::RtpL24Pay).unwrap();
            assert_eq!(
                payloader.prop("min-ptime").and_then(PropValue::as_i64),
                Some(ns)
            );
            assert_eq!(
                payloader.prop("max-ptime").and_then(PropValue::as_i64),
                Some(ns)
            );
        }
    }

    #[test]
    fn codec_selects_format_and_payloader() {
        let l24 = build(&params());
        assert_eq!(
            l24.stage(StageKind::FormatCaps)
                .unwrap()
                .prop("format")
                .and_then(PropValue::as_str),
            Some("S24BE")
        );
        assert!(l24.stage(StageKind::RtpL24Pay).is_some());
        assert!(l24.stage(StageKind::RtpL16Pay).is_none());

        let l16 = build(&StreamParameters {
            codec: Codec::L16,
            ..params()
        });
        assert_eq!(
            l16.stage(StageKind::FormatCaps)
                .unwrap()
                .prop("format")
                .and_then(PropValue::as_str),
            Some("S16BE")
        );
        assert!(l16.stage(StageKind::RtpL16Pay).is_some());
        assert!(l16.stage(StageKind::RtpL24Pay).is_none());
    }

    #[test]
    fn explicit_source_params_are_carried_verbatim() {
        let description = build(&StreamParameters {
            source_params: "  freq=480 volume=0.1 ".to_string(),
            ..params()
        });
        let source = description.stage(StageKind::TestSource).unwrap();
        assert_eq!(
            source.props(),
            &[
                ("freq".to_string(), PropValue::Str("480".to_string())),
                ("volume".to_string(), PropValue::Str("0.1".to_string())),
            ]
        );
    }

    #[test]
    fn empty_source_params_inject_a_random_frequency() {
        let description = build(&params());
        let source = description.stage(StageKind::TestSource).unwrap();
        assert_eq!(source.props().len(), 1);
        let freq = source.prop("freq").and_then(PropValue::as_i64).unwrap();
        assert!((240..1000).contains(&freq), "frequency {freq} out of range");
    }

    #[test]
    fn build_is_deterministic_under_a_fixed_seed() {
        let a = build_with_rng(&params(), &mut StdRng::seed_from_u64(7));
        let b = build_with_rng(&params(), &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn rtp_caps_restate_upstream_rate_and_channels() {
        let description = build(&StreamParameters {
            channels: 2,
            sample_rate: SampleRate::Hz96000,
            ..params()
        });
        let caps = description.stage(StageKind::FormatCaps).unwrap();
        let rtp = description.stage(StageKind::RtpCaps).unwrap();
        assert_eq!(
            caps.prop("rate").and_then(PropValue::as_i64),
            rtp.prop("clock-rate").and_then(PropValue::as_i64)
        );
        assert_eq!(
            caps.prop("channels").and_then(PropValue::as_i64),
            rtp.prop("channels").and_then(PropValue::as_i64)
        );
        assert_eq!(rtp.prop("payload").and_then(PropValue::as_i64), Some(98));
    }

    #[test]
    fn sink_carries_destination_and_qos() {
        let description = build(&params());
        let sink = description.stage(StageKind::UdpSink).unwrap();
        assert_eq!(
            sink.prop("host").and_then(PropValue::as_str),
            Some("239.69.0.121")
        );
        assert_eq!(sink.prop("port").and_then(PropValue::as_i64), Some(5004));
        assert_eq!(sink.prop("qos").and_then(PropValue::as_bool), Some(true));
        assert_eq!(sink.prop("qos-dscp").and_then(PropValue::as_i64), Some(34));
        assert_eq!(
            sink.prop("multicast-iface").and_then(PropValue::as_str),
            Some("en7")
        );
    }
}
