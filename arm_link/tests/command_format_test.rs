use arm_link::packets::{encode, Command, CommandKind, ControllerReply, Param, ReplyCode};
use arm_link::LinkError;

#[test]
fn test_protocol_table_tags_and_arities() {
    let table = [
        (CommandKind::ExitCalibration, "1", 0),
        (CommandKind::JointMove, "3", 5),
        (CommandKind::SetSpeed, "4", 1),
        (CommandKind::XyzMove, "5", 3),
        (CommandKind::EnterCalibration, "6", 0),
        (CommandKind::OpenGripper, "7", 0),
        (CommandKind::CloseGripper, "8", 0),
        (CommandKind::CalibrateTargets, "calibrate", 3),
    ];
    for (kind, tag, arity) in table {
        assert_eq!(kind.tag(), tag, "wrong tag for {:?}", kind);
        assert_eq!(kind.arity(), arity, "wrong arity for {:?}", kind);
    }
}

#[test]
fn test_joint_move_matches_controller_format() {
    let command = Command::joint_move([0.0, -90.0, 0.0, 0.0, 0.0]);
    assert_eq!(command.encode(), "3$0$-90$0$0$0");
    assert_eq!(command.to_string(), "3$0$-90$0$0$0");
}

#[test]
fn test_fractional_values_keep_their_precision() {
    let command = Command::xyz_move([12.5, -0.25, 100.0]);
    assert_eq!(command.encode(), "5$12.5$-0.25$100");
}

#[test]
fn test_param_order_is_never_changed() {
    let params: Vec<Param> = [5, 4, 3].into_iter().map(Param::from).collect();
    assert_eq!(encode(CommandKind::CalibrateTargets, &params).unwrap(), "calibrate$5$4$3");
}

#[test]
fn test_mismatched_arity_fails_loudly() {
    let params = vec![Param::from(1.0)];
    let result = encode(CommandKind::JointMove, &params);
    assert!(
        matches!(result, Err(LinkError::InvalidCommandArity { expected: 5, actual: 1, .. })),
        "Expected an arity error, got: {:?}",
        result
    );
}

#[test]
fn test_no_delimiter_trails_the_last_field() {
    for command in [Command::set_speed(100.0), Command::close_gripper(), Command::calibrate([1.0, 2.0, 3.0])] {
        let encoded = command.encode();
        assert!(!encoded.ends_with('$'), "trailing delimiter in {}", encoded);
    }
}

#[test]
fn test_unknown_command_reply_from_controller() {
    let reply: ControllerReply = "10$Command with identifier: 2 not found.".parse().unwrap();
    assert_eq!(reply.code, ReplyCode::UnknownCommand);
    assert!(!reply.code.is_ok());
    assert_eq!(reply.to_string(), "unknown command: Command with identifier: 2 not found.");
}
