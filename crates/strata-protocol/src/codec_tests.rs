//! Unit tests for the message codec.

use glam::Vec3;

use super::*;
use crate::kinematics::MotionParams;
use crate::messages::*;

fn entity_state() -> EntityState {
    EntityState {
        id: 42,
        t: EntityKind::Npc,
        p: Vec3::new(1.5, 0.0, -2.25),
        r: Vec3::new(0.0, 3.0, 0.0),
        v: Vec3::new(0.5, -1.0, 0.0),
        h: 75.0,
    }
}

/// One representative value per message type. Vector components are chosen
/// to be exact at wire precision so equality holds without tolerance.
fn one_of_each() -> Vec<Message> {
    vec![
        Message::Handshake(Handshake {
            session_token: "tok".into(),
            client_id: "client_ab12".into(),
            protocol_version: PROTOCOL_VERSION,
        }),
        Message::InputFrame(InputFrame {
            tick: 10,
            seq: 3,
            movement: Vec3::new(1.0, 0.0, -0.5),
            aim: Vec3::new(0.0, 0.0, -1.0),
            flags: action_flags::JUMP,
        }),
        Message::TerraformRequest(TerraformRequest {
            op: TerraformKind::SphereAdd,
            center: Vec3::new(10.0, 5.0, 20.0),
            radius: 3.0,
            material: 2,
        }),
        Message::ChunkRequest(ChunkRequest {
            chunk: [0, -1, 2],
            known_version: 4,
        }),
        Message::Ping(Ping {
            client_time: 1234.5,
        }),
        Message::Disconnect(Disconnect {
            reason: Some("bye".into()),
        }),
        Message::SpellCastRequest(SpellCastRequest {
            spell_id: "fireball".into(),
            direction: Vec3::new(0.0, 0.0, 1.0),
        }),
        Message::HandshakeResponse(HandshakeResponse {
            success: true,
            client_id: "client_ab12".into(),
            entity_id: Some(1),
            tick: 99,
            tick_rate: 60,
            snapshot_rate: 20,
            protocol_version: PROTOCOL_VERSION,
            motion: Some(MotionParams::default()),
            error: None,
        }),
        Message::StateSnapshot(StateSnapshot {
            tick: 300,
            entities: vec![entity_state()],
            player: Some(PlayerAck {
                seq: 2,
                p: Vec3::new(4.0, 0.0, 4.0),
                v: Vec3::ZERO,
                g: true,
            }),
        }),
        Message::EntitySpawn(EntitySpawn {
            state: entity_state(),
            owner: Some(7),
        }),
        Message::EntityDespawn(EntityDespawn { id: 42 }),
        Message::ProjectileHit(ProjectileHit {
            projectile_id: 5,
            hit_entity_id: Some(9),
            hit_point: Vec3::new(0.0, 0.0, 9.5),
            hit_normal: Vec3::new(0.0, 0.0, -1.0),
            damage: 25.0,
            tick: 30,
        }),
        Message::NpcEvent(NpcEvent {
            npc_id: 3,
            event: NpcEventKind::Spotted,
            state: DetectionState::Spotted,
            target_id: Some(1),
            suspicion: 0.875,
            tick: 120,
        }),
        Message::TerraformApplied(TerraformApplied {
            op: TerraformKind::Paint,
            center: Vec3::new(1.0, 2.0, 3.0),
            radius: 2.5,
            material: 4,
            chunks: vec![ChunkVersion {
                chunk: [0, 0, 0],
                version: 2,
            }],
            tick: 8,
        }),
        Message::ChunkData(ChunkData {
            chunk: [1, 0, -1],
            version: 3,
            compressed: true,
            data: "AAEC".into(),
        }),
        Message::Pong(Pong {
            client_time: 1234.5,
            server_tick: 77,
        }),
        Message::error(ErrorCode::Malformed, "bad json"),
        Message::PlayerJoined(PlayerJoined {
            client_id: "client_ab12".into(),
            entity_id: 1,
        }),
        Message::PlayerLeft(PlayerLeft {
            client_id: "client_ab12".into(),
            entity_id: 1,
        }),
        Message::SpellCastEvent(SpellCastEvent {
            caster_id: 1,
            spell_id: "fireball".into(),
            origin: Vec3::new(0.0, 1.5, 0.0),
            direction: Vec3::new(0.0, 0.0, 1.0),
            projectile_id: Some(12),
            tick: 40,
        }),
    ]
}

#[test]
fn test_every_message_type_round_trips() {
    let messages = one_of_each();
    assert_eq!(messages.len(), 20);
    for message in messages {
        let text = encode(&message).unwrap();
        let back = decode(&text).unwrap();
        assert_eq!(back, message, "round trip changed {text}");
    }
}

#[test]
fn test_encoded_type_field_matches_discriminator() {
    for message in one_of_each() {
        let value: Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
        assert_eq!(
            value[TYPE_FIELD].as_u64(),
            Some(message.message_type() as u64)
        );
    }
}

#[test]
fn test_vectors_round_trip_within_precision() {
    let frame = InputFrame {
        tick: 1,
        seq: 1,
        movement: Vec3::new(0.123456, -0.98765, 0.5),
        aim: Vec3::new(0.70710677, 0.0, 0.70710677),
        flags: 0,
    };
    let text = encode(&Message::InputFrame(frame.clone())).unwrap();
    let Message::InputFrame(back) = decode(&text).unwrap() else {
        panic!("wrong variant");
    };
    assert!((back.movement - frame.movement).abs().max_element() <= 1e-3);
    assert!((back.aim - frame.aim).abs().max_element() <= 1e-3);
}

#[test]
fn test_input_frame_wire_shape() {
    let text = r#"{"type":2,"tick":5,"seq":9,"move":[1,0,0],"aim":[0,0,-1],"flags":1}"#;
    let Message::InputFrame(frame) = decode(text).unwrap() else {
        panic!("wrong variant");
    };
    assert_eq!(frame.seq, 9);
    assert_eq!(frame.movement, Vec3::X);
    assert_eq!(frame.flags, action_flags::JUMP);
}

#[test]
fn test_extra_fields_are_ignored() {
    let text = r#"{"type":5,"client_time":1.0,"extra":"x"}"#;
    assert!(matches!(decode(text).unwrap(), Message::Ping(_)));
}

#[test]
fn test_missing_type_is_rejected() {
    let err = decode(r#"{"client_time":1.0}"#).unwrap_err();
    assert!(matches!(err, CodecError::MissingType));
}

#[test]
fn test_string_type_is_rejected() {
    let err = decode(r#"{"type":"5","client_time":1.0}"#).unwrap_err();
    assert!(matches!(err, CodecError::MissingType));
}

#[test]
fn test_unknown_type_is_rejected() {
    let err = decode(r#"{"type":55}"#).unwrap_err();
    assert!(matches!(err, CodecError::UnknownType(55)));
    let err = decode(r#"{"type":70000}"#).unwrap_err();
    assert!(matches!(err, CodecError::UnknownType(70000)));
}

#[test]
fn test_non_object_is_rejected() {
    assert!(matches!(decode("[1,2,3]"), Err(CodecError::NotAnObject)));
    assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
}

#[test]
fn test_wrong_payload_shape_is_rejected() {
    let err = decode(r#"{"type":4,"chunk":[0,0]}"#).unwrap_err();
    assert!(matches!(err, CodecError::Json(_)));
}
