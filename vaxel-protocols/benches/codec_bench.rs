use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vaxel_protocols::openflow::{echo_request, Action, FlowModCommand, MatchField, PacketIn};
use vaxel_protocols::packet::{build, IP_PROTO_UDP};
use vaxel_protocols::{BufferRef, FlowEntry, OpenFlowFramer, Priority};

fn packet_in_stream(count: usize) -> Vec<u8> {
    let frame = build::ethernet(
        Default::default(),
        Default::default(),
        0x0800,
        &build::ipv4(
            [10, 0, 0, 1].into(),
            [10, 0, 0, 2].into(),
            IP_PROTO_UDP,
            &build::udp(5000, 53, &[0u8; 64]),
        ),
    );
    let message = PacketIn {
        buffer_id: 1,
        total_len: frame.len() as u16,
        in_port: 1,
        reason: PacketIn::REASON_NO_MATCH,
        data: Bytes::from(frame),
    }
    .encode(0);

    let mut stream = Vec::new();
    for _ in 0..count {
        stream.extend_from_slice(&message);
        stream.extend_from_slice(&echo_request(1, b"ping"));
    }
    stream
}

fn bench_framing(c: &mut Criterion) {
    let stream = packet_in_stream(64);
    c.bench_function("framer_reassembly_1k_chunks", |b| {
        b.iter(|| {
            let mut framer = OpenFlowFramer::new();
            let mut frames = 0;
            for chunk in stream.chunks(1024) {
                framer.push(black_box(chunk));
                while let Some(Ok(_)) = framer.next_frame() {
                    frames += 1;
                }
            }
            frames
        })
    });
}

fn bench_flow_render(c: &mut Criterion) {
    let mut entry = FlowEntry::default();
    entry
        .set_field(MatchField::InPort(1))
        .set_field(MatchField::DlType(0x0800))
        .set_field(MatchField::NwProto(IP_PROTO_UDP))
        .set_field(MatchField::TpDst(53))
        .set_priority(Priority::High)
        .set_timeouts(5, 0)
        .add_action(Action::output(2))
        .set_buffer(BufferRef::Buffered(7));

    c.bench_function("flow_render_install", |b| {
        b.iter(|| black_box(&entry).render_install(FlowModCommand::Add, 1))
    });
    c.bench_function("flow_render_emit", |b| {
        b.iter(|| black_box(&entry).render_emit(true, 1).with_payload(&[0u8; 128]))
    });
}

criterion_group!(benches, bench_framing, bench_flow_render);
criterion_main!(benches);
