use serde_bytes::ByteBuf;
use tether::{
    MessagePackTranscoder, Multiplexer, MuxError, MuxMessage, ReceivedMessage, RpcResponse,
    Transcoder, Value,
};

fn mux() -> Multiplexer {
    Multiplexer::new(Box::new(MessagePackTranscoder))
}

/// Carries one peer's frame to the other as an in-order arrival.
fn deliver(from: &mut Multiplexer, to: &mut Multiplexer) -> tether::MuxOutput {
    let frame = from.send().unwrap();
    to.receive_message(&[ReceivedMessage::Full(frame)]).unwrap()
}

#[test]
fn call_ids_count_up_from_one() {
    let mut caller = mux();
    assert_eq!(caller.call_fn("add", None), 1);
    assert_eq!(caller.call_fn("sum", None), 2);
    assert_eq!(caller.call_fn_ordered("add", None), 3);
}

#[test]
fn rpc_round_trip() {
    let mut caller = mux();
    let mut callee = mux();

    let add_id = caller.call_fn("add", Some(b"12345".to_vec()));
    let sum_id = caller.call_fn("sum", None);

    let out = deliver(&mut caller, &mut callee);
    assert_eq!(out.calls.len(), 2);
    assert_eq!(out.calls[0].id, add_id);
    assert_eq!(out.calls[0].method, "add");
    assert_eq!(out.calls[0].args.as_deref(), Some(&b"12345"[..]));
    assert_eq!(out.calls[1].id, sum_id);
    assert_eq!(out.calls[1].args, None);

    callee
        .send_fn_call_response(add_id, Some(b"ok".to_vec()), false)
        .unwrap();
    callee
        .send_fn_call_response(sum_id, Some(b"bad".to_vec()), true)
        .unwrap();

    let out = deliver(&mut callee, &mut caller);
    assert_eq!(out.results.len(), 2);
    assert_eq!(out.results[0].id, add_id);
    assert_eq!(out.results[0].method, "add");
    assert_eq!(out.results[0].result, Ok(b"ok".to_vec()));
    assert_eq!(out.results[1].id, sum_id);
    assert_eq!(out.results[1].method, "sum");
    assert_eq!(out.results[1].result, Err(b"bad".to_vec()));
}

#[test]
fn requests_are_not_repeated_once_sent() {
    let mut caller = mux();
    caller.call_fn("add", None);

    let first = caller.send().unwrap();
    let tc = MessagePackTranscoder;
    assert_eq!(tc.decode(&first).unwrap().req_rpc.len(), 1);

    // the call is still pending but already on the wire
    let second = caller.send().unwrap();
    assert!(tc.decode(&second).unwrap().is_empty());
}

#[test]
fn responding_to_an_unknown_call_fails() {
    let mut callee = mux();
    let err = callee.send_fn_call_response(42, None, false).unwrap_err();
    assert!(matches!(err, MuxError::UnknownPendingCall { id: 42 }));
}

#[test]
fn response_for_a_call_never_made_is_dropped() {
    let mut caller = mux();

    let mut stray = MuxMessage::default();
    stray.res_rpc.insert(
        99,
        RpcResponse {
            returns: Some(ByteBuf::from(b"?".to_vec())),
            is_error: false,
        },
    );
    let frame = MessagePackTranscoder.encode(&stray).unwrap();

    let out = caller
        .receive_message(&[ReceivedMessage::Full(frame)])
        .unwrap();
    assert!(out.results.is_empty());
}

#[test]
fn an_undecodable_frame_fails_the_whole_batch_cleanly() {
    let mut caller = mux();
    let mut callee = mux();

    let id = caller.call_fn("add", None);
    let frame = caller.send().unwrap();

    // 0xc1 is never valid MessagePack
    let result = callee.receive_message(&[
        ReceivedMessage::Full(frame.clone()),
        ReceivedMessage::Full(vec![0xc1]),
    ]);
    assert!(result.is_err());

    // the good frame must not have been applied
    let err = callee.send_fn_call_response(id, None, false).unwrap_err();
    assert!(matches!(err, MuxError::UnknownPendingCall { .. }));

    // redelivered alone, it surfaces the call as usual
    let out = callee
        .receive_message(&[ReceivedMessage::Full(frame)])
        .unwrap();
    assert_eq!(out.calls.len(), 1);
    assert_eq!(out.calls[0].id, id);
}

#[test]
fn unconfirmed_sends_commit_nothing() {
    let mut caller = mux();
    caller.call_fn("add", None);
    caller.send_event(b"ev".to_vec());

    // build a frame and pretend the transport rejected it
    let (first, _dropped) = caller.send_unconfirmed().unwrap();

    let (second, confirmation) = caller.send_unconfirmed().unwrap();
    assert_eq!(first, second);

    caller.confirm_send(confirmation);
    let (third, _) = caller.send_unconfirmed().unwrap();
    let tc = MessagePackTranscoder;
    assert!(tc.decode(&third).unwrap().is_empty());
}

#[test]
fn ordered_sections_wait_for_the_ordered_stream() {
    let mut sender = mux();
    let mut receiver = mux();

    sender.send_event(b"1".to_vec());
    sender.send_event_ordered(b"3".to_vec());
    sender.send_event(b"2".to_vec());
    let frame = sender.send().unwrap();

    // the frame first arrives ahead of a gap
    let out = receiver
        .receive_message(&[ReceivedMessage::Unordered(frame.clone())])
        .unwrap();
    assert_eq!(out.events, vec![b"1".to_vec(), b"2".to_vec()]);
    assert!(out.events_ordered.is_empty());

    // the gap closes and the same payload comes back in order
    let out = receiver
        .receive_message(&[ReceivedMessage::Ordered(frame)])
        .unwrap();
    assert!(out.events.is_empty());
    assert_eq!(out.events_ordered, vec![b"3".to_vec()]);
}

#[test]
fn object_diffs_converge_the_incoming_tree() {
    let mut sender = mux();
    let mut receiver = mux();

    sender
        .outgoing_mut()
        .insert("int".into(), Value::Int(1234));
    sender
        .outgoing_mut()
        .insert("str".into(), Value::Str("test".into()));
    deliver(&mut sender, &mut receiver);
    assert_eq!(receiver.incoming(), sender.outgoing());

    sender.outgoing_mut().remove("int");
    sender
        .outgoing_mut()
        .insert("str".into(), Value::Str("changed".into()));
    let out = deliver(&mut sender, &mut receiver);
    assert!(out.obj_delete.is_some());
    assert!(out.obj_sync.is_some());
    assert_eq!(receiver.incoming(), sender.outgoing());

    // nothing changed, so nothing travels
    let out = deliver(&mut sender, &mut receiver);
    assert_eq!(out.obj_sync, None);
    assert_eq!(out.obj_delete, None);
}

#[test]
fn full_object_replaces_the_incoming_tree() {
    let mut sender = mux();
    let mut receiver = mux();

    // the receiver holds state the sender knows nothing about
    let mut earlier_peer = mux();
    earlier_peer
        .outgoing_mut()
        .insert("stale".into(), Value::Bool(true));
    deliver(&mut earlier_peer, &mut receiver);
    assert!(receiver.incoming().get("stale").is_some());

    sender.outgoing_mut().insert("fresh".into(), Value::Int(1));
    sender.request_full_object();
    let out = deliver(&mut sender, &mut receiver);

    assert!(out.obj_all.is_some());
    assert_eq!(receiver.incoming(), sender.outgoing());
    assert!(receiver.incoming().get("stale").is_none());
}

#[test]
fn snapshot_preserves_pending_work() {
    let mut caller = mux();
    let id = caller.call_fn("add", Some(b"x".to_vec()));
    caller.send_event(b"ev".to_vec());
    caller.outgoing_mut().insert("k".into(), Value::Int(7));

    let state = caller.save_state().unwrap();
    let mut revived =
        Multiplexer::restore_state(Box::new(MessagePackTranscoder), &state).unwrap();

    let mut callee = mux();
    let out = deliver(&mut revived, &mut callee);
    assert_eq!(out.calls.len(), 1);
    assert_eq!(out.calls[0].id, id);
    assert_eq!(out.events, vec![b"ev".to_vec()]);
    assert_eq!(callee.incoming().get("k"), Some(&Value::Int(7)));
}
