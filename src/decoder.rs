use crate::protocol::{paths, tags, typed_bool, typed_i64, typed_str, RawEvents};
use crate::types::{PlaybackState, SongInfo, Source, SpeakerEvent, SpeakerStatus};
use serde_json::Value;

/// Decoding choices the protocol leaves open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderPolicy {
    /// Source to report while the speaker says `powerOn` as its source.
    ///
    /// Right after power-on the device has not picked an input yet. `None`
    /// leaves `source` unset in that state.
    pub power_on_source: Option<Source>,
}

type Extractor = fn(&Value, &DecoderPolicy, &mut SpeakerEvent);

/// Known paths and the field(s) each one fills
const EXTRACTORS: &[(&str, Extractor)] = &[
    (paths::VOLUME, extract_volume),
    (paths::PHYSICAL_SOURCE, extract_source),
    (paths::SPEAKER_STATUS, extract_speaker_status),
    (paths::DEVICE_NAME, extract_device_name),
    (paths::MUTE, extract_mute),
    (paths::PLAYER_DATA, extract_player_data),
    (paths::PLAY_TIME, extract_play_time),
];

/// Turns raw poll payloads into [`SpeakerEvent`]s
///
/// Decoding is total: unknown paths and payloads of the wrong shape leave
/// the corresponding fields unset.
#[derive(Debug, Clone, Default)]
pub struct EventDecoder {
    policy: DecoderPolicy,
}

impl EventDecoder {
    pub fn new(policy: DecoderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DecoderPolicy {
        &self.policy
    }

    pub fn decode(&self, events: &RawEvents) -> SpeakerEvent {
        let mut event = SpeakerEvent::default();
        for (path, value) in events {
            match EXTRACTORS.iter().find(|(known, _)| *known == path.as_str()) {
                Some((_, extract)) => extract(value, &self.policy, &mut event),
                None => tracing::trace!(path = %path, "Ignoring unobserved path"),
            }
        }
        event
    }
}

/// Decode with the default policy
pub fn decode(events: &RawEvents) -> SpeakerEvent {
    EventDecoder::default().decode(events)
}

fn extract_volume(value: &Value, _: &DecoderPolicy, event: &mut SpeakerEvent) {
    event.volume = typed_i64(value, tags::I32).and_then(|v| i32::try_from(v).ok());
}

pub(crate) fn source_from_value(value: &Value, policy: &DecoderPolicy) -> Option<Source> {
    match typed_str(value, tags::PHYSICAL_SOURCE)? {
        "powerOn" => policy.power_on_source,
        "standby" => None,
        other => Source::from_wire(other),
    }
}

fn extract_source(value: &Value, policy: &DecoderPolicy, event: &mut SpeakerEvent) {
    event.source = source_from_value(value, policy);
}

fn extract_speaker_status(value: &Value, _: &DecoderPolicy, event: &mut SpeakerEvent) {
    event.speaker_status = typed_str(value, tags::SPEAKER_STATUS).and_then(SpeakerStatus::from_wire);
}

fn extract_device_name(value: &Value, _: &DecoderPolicy, event: &mut SpeakerEvent) {
    event.device_name = typed_str(value, tags::STRING).map(str::to_string);
}

fn extract_mute(value: &Value, _: &DecoderPolicy, event: &mut SpeakerEvent) {
    event.is_muted = typed_bool(value, tags::BOOL);
}

fn extract_play_time(value: &Value, _: &DecoderPolicy, event: &mut SpeakerEvent) {
    event.song_position = typed_i64(value, tags::I64).or_else(|| typed_i64(value, tags::I32));
}

fn extract_player_data(value: &Value, _: &DecoderPolicy, event: &mut SpeakerEvent) {
    let data = PlayerData::from_value(value);
    event.song_info = data.song_info;
    event.song_duration = data.duration;
    event.playback_state = data.state;
}

/// What a `player:player/data` payload carries
#[derive(Debug, Default, PartialEq)]
pub(crate) struct PlayerData {
    pub song_info: Option<SongInfo>,
    pub duration: Option<i64>,
    pub state: Option<PlaybackState>,
}

impl PlayerData {
    pub(crate) fn from_value(value: &Value) -> Self {
        // some firmware wraps the payload as {"type": "playerData", "playerData": {...}}
        let data = match value.get("playerData") {
            Some(inner) if inner.is_object() => inner,
            _ => value,
        };

        let state = data
            .get("state")
            .and_then(Value::as_str)
            .and_then(PlaybackState::from_wire);

        let duration = data
            .get("status")
            .and_then(|s| s.get("duration"))
            .and_then(Value::as_i64);

        let song_info = data.get("trackRoles").and_then(|roles| {
            let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
            let meta = roles.get("mediaData").and_then(|m| m.get("metaData"));
            let info = SongInfo {
                title: text(roles.get("title")),
                artist: text(meta.and_then(|m| m.get("artist"))),
                album: text(meta.and_then(|m| m.get("album"))),
                cover_url: text(roles.get("icon")),
            };
            (!info.is_empty()).then_some(info)
        });

        Self {
            song_info,
            duration,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_poll_response;
    use crate::test_support::PLAYER_DATA_PLAYING;
    use serde_json::json;

    fn events(pairs: Vec<(&str, Value)>) -> RawEvents {
        pairs
            .into_iter()
            .map(|(path, value)| (path.to_string(), value))
            .collect()
    }

    #[test]
    fn volume_poll_decodes_to_volume_only() {
        let raw = parse_poll_response(r#"[{"path":"player:volume","itemValue":{"i32_":42}}]"#).unwrap();
        let event = decode(&raw);
        assert_eq!(
            event,
            SpeakerEvent {
                volume: Some(42),
                ..Default::default()
            }
        );
    }

    #[test]
    fn empty_poll_decodes_to_empty_event() {
        let raw = parse_poll_response("[]").unwrap();
        assert!(decode(&raw).is_empty());
    }

    #[test]
    fn player_data_yields_song_duration_and_state() {
        let value: Value = serde_json::from_str(PLAYER_DATA_PLAYING).unwrap();
        let event = decode(&events(vec![(paths::PLAYER_DATA, value)]));

        assert_eq!(event.playback_state, Some(PlaybackState::Playing));
        assert_eq!(event.song_duration, Some(215000));
        assert_eq!(
            event.song_info,
            Some(SongInfo {
                title: Some("Teardrop".to_string()),
                artist: Some("Massive Attack".to_string()),
                album: Some("Mezzanine".to_string()),
                cover_url: Some("http://covers.example/teardrop.jpg".to_string()),
            })
        );
        assert!(event.volume.is_none());
    }

    #[test]
    fn wrapped_player_data_is_unwrapped() {
        let value = json!({
            "type": "playerData",
            "playerData": {"state": "paused", "trackRoles": {"title": "Angel"}}
        });
        let event = decode(&events(vec![(paths::PLAYER_DATA, value)]));
        assert_eq!(event.playback_state, Some(PlaybackState::Paused));
        assert_eq!(event.song_info.unwrap().title.as_deref(), Some("Angel"));
    }

    #[test]
    fn player_data_without_track_has_no_song_info() {
        let value = json!({"state": "stopped", "trackRoles": {}});
        let event = decode(&events(vec![(paths::PLAYER_DATA, value)]));
        assert_eq!(event.playback_state, Some(PlaybackState::Stopped));
        assert!(event.song_info.is_none());
    }

    #[test]
    fn power_states_are_not_reported_as_sources() {
        for state in ["standby", "powerOn"] {
            let value = json!({"type": "kefPhysicalSource", "kefPhysicalSource": state});
            let event = decode(&events(vec![(paths::PHYSICAL_SOURCE, value)]));
            assert!(event.source.is_none(), "{} leaked as a source", state);
        }

        let value = json!({"type": "kefPhysicalSource", "kefPhysicalSource": "optic"});
        let event = decode(&events(vec![(paths::PHYSICAL_SOURCE, value)]));
        assert_eq!(event.source, Some(Source::Optic));
    }

    #[test]
    fn power_on_source_policy_is_opt_in() {
        let decoder = EventDecoder::new(DecoderPolicy {
            power_on_source: Some(Source::Wifi),
        });
        let value = json!({"kefPhysicalSource": "powerOn"});
        let event = decoder.decode(&events(vec![(paths::PHYSICAL_SOURCE, value)]));
        assert_eq!(event.source, Some(Source::Wifi));

        let value = json!({"kefPhysicalSource": "standby"});
        let event = decoder.decode(&events(vec![(paths::PHYSICAL_SOURCE, value)]));
        assert!(event.source.is_none());
    }

    #[test]
    fn scalar_paths_decode() {
        let event = decode(&events(vec![
            (paths::DEVICE_NAME, json!({"type": "string_", "string_": "Study"})),
            (paths::MUTE, json!({"type": "bool_", "bool_": true})),
            (paths::SPEAKER_STATUS, json!({"type": "kefSpeakerStatus", "kefSpeakerStatus": "standby"})),
            (paths::PLAY_TIME, json!({"type": "i64_", "i64_": 61000})),
        ]));

        assert_eq!(event.device_name.as_deref(), Some("Study"));
        assert_eq!(event.is_muted, Some(true));
        assert_eq!(event.speaker_status, Some(SpeakerStatus::Standby));
        assert_eq!(event.song_position, Some(61000));
    }

    #[test]
    fn garbage_never_fails_and_sets_nothing() {
        let event = decode(&events(vec![
            (paths::VOLUME, json!("loud")),
            (paths::VOLUME, json!({"i32_": 1u64 << 40})),
            (paths::PHYSICAL_SOURCE, json!({"kefPhysicalSource": "gramophone"})),
            (paths::SPEAKER_STATUS, json!(null)),
            (paths::DEVICE_NAME, json!({"string_": 7})),
            (paths::MUTE, json!({"bool_": "yes"})),
            (paths::PLAYER_DATA, json!([1, 2, 3])),
            (paths::PLAY_TIME, json!({"i64_": "soon"})),
            ("kef:unknown/path", json!({"anything": true})),
            ("network:info", json!({"type": "networkInfo"})),
        ]));
        assert!(event.is_empty());
    }

    #[test]
    fn volume_out_of_i32_range_is_dropped() {
        let event = decode(&events(vec![(paths::VOLUME, json!({"i32_": 1u64 << 40}))]));
        assert!(event.volume.is_none());
    }
}
