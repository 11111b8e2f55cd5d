use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ah_midi_osc::general::forwarder::{spawn_forwarder, EventProcessor};
use ah_midi_osc::general::queue::ingest_queue;
use ah_midi_osc::midi::sysex::SysExLayout;
use ah_midi_osc::midi::{MidiDecoder, RawMidiEvent};
use ah_midi_osc::remote::osc_sender::{Dispatcher, OscTransport, Target};
use ah_midi_osc::template::TemplateEngine;
use rosc::{decoder, OscMessage, OscPacket, OscType};

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

impl Recorder {
    fn messages(&self) -> Vec<OscMessage> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|p| match decoder::decode_udp(p).unwrap().1 {
                OscPacket::Message(m) => m,
                other => panic!("unexpected bundle {:?}", other),
            })
            .collect()
    }
}

impl OscTransport for Recorder {
    fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().push(packet.to_vec());
        Ok(packet.len())
    }
}

fn processor(recorder: &Recorder) -> EventProcessor {
    let engine = TemplateEngine::from_json(include_str!("../config/templates.json")).unwrap();
    let decoder = MidiDecoder::new(SysExLayout::defaults(), Duration::from_millis(80));
    let dispatcher = Dispatcher::new(
        vec![(
            Target::new("recorder", "127.0.0.1", 9000),
            Box::new(recorder.clone()) as Box<dyn OscTransport>,
        )],
        64,
    )
    .unwrap();
    EventProcessor::new(decoder, engine, dispatcher)
}

fn fader_frames() -> Vec<Vec<u8>> {
    vec![
        vec![0xB0, 99, 0x21],
        vec![0xB0, 98, 0x17],
        vec![0xB0, 6, 0x62],
        vec![0xB0, 38, 0x07],
    ]
}

fn finish(processor: EventProcessor) {
    assert_eq!(processor.into_dispatcher().shutdown(Duration::from_secs(2)), 0);
}

#[test]
fn malformed_sysex_is_dropped_and_pipeline_continues() {
    let recorder = Recorder::default();
    let mut p = processor(&recorder);
    let stats = p.stats();
    let t = Instant::now();

    // A&H header cut off before the device id.
    let bad = RawMidiEvent::received_at(vec![0xF0, 0x00, 0x00, 0x1A, 0xF7], 0, t);
    assert_eq!(p.process(&bad), 0);
    assert_eq!(stats.decode_errors(), 1);

    let mut sent = 0;
    for bytes in fader_frames() {
        sent += p.process(&RawMidiEvent::received_at(bytes, 0, t));
    }
    assert_eq!(sent, 1);
    finish(p);

    let value = (0x62u16 << 7 | 0x07) as f32 / 16383.0;
    assert_eq!(
        recorder.messages(),
        vec![OscMessage {
            addr: "/qu/channel/2/fader".to_string(),
            args: vec![OscType::Float(value)],
        }]
    );
    assert_eq!(stats.events(), 5);
    assert_eq!(stats.osc_messages(), 1);
}

#[test]
fn console_info_fans_out_to_two_templates_in_order() {
    let recorder = Recorder::default();
    let mut p = processor(&recorder);
    let info = vec![
        0xF0, 0x00, 0x00, 0x1A, 0x50, 0x11, 0x01, 0x00, 0x00, 0x11, 0x01, 0x01, 0x05, 0xF7,
    ];
    assert_eq!(p.process(&RawMidiEvent::new(info, 0)), 2);
    finish(p);

    assert_eq!(
        recorder.messages(),
        vec![
            OscMessage {
                addr: "/qu/console/type".to_string(),
                args: vec![OscType::String("qu-16".to_string())],
            },
            OscMessage {
                addr: "/qu/console/fw-version".to_string(),
                args: vec![OscType::String("1.5".to_string())],
            },
        ]
    );
}

#[test]
fn channel_name_and_mmc() {
    let recorder = Recorder::default();
    let mut p = processor(&recorder);
    let mut name = vec![0xF0, 0x00, 0x00, 0x1A, 0x50, 0x11, 0x01, 0x00, 0x00, 0x02, 0x20];
    name.extend_from_slice(b"Kick\0\0");
    name.push(0xF7);
    p.process(&RawMidiEvent::new(name, 0));
    p.process(&RawMidiEvent::new(vec![0xF0, 0x7F, 0x7F, 0x06, 0x02, 0xF7], 0));
    p.process(&RawMidiEvent::new(vec![0xF0, 0x7F, 0x7F, 0x06, 0x44, 0xF7], 0));
    finish(p);

    let got: Vec<_> = recorder.messages().into_iter().map(|m| (m.addr, m.args)).collect();
    assert_eq!(
        got,
        vec![
            ("/qu/channel/1/name".to_string(), vec![OscType::String("Kick".to_string())]),
            ("/qu/mmc/play".to_string(), vec![]),
            ("/qu/mmc/unknown".to_string(), vec![]),
        ]
    );
}

#[test]
fn stale_nrpn_fragments_are_not_stitched() {
    let recorder = Recorder::default();
    let mut p = processor(&recorder);
    let t0 = Instant::now();
    let late = t0 + Duration::from_millis(500);
    let frames = fader_frames();

    p.process(&RawMidiEvent::received_at(frames[0].clone(), 0, t0));
    p.process(&RawMidiEvent::received_at(frames[1].clone(), 0, t0));
    let mut sent = 0;
    for bytes in &frames[2..] {
        sent += p.process(&RawMidiEvent::received_at(bytes.clone(), 0, late));
    }
    assert_eq!(sent, 0);
    finish(p);
    assert!(recorder.messages().is_empty());
}

#[test]
fn backlogged_nrpn_sequence_still_assembles() {
    let recorder = Recorder::default();
    let (producer, consumer) = ingest_queue(32);
    let t0 = Instant::now();
    for (i, bytes) in fader_frames().into_iter().enumerate() {
        producer.push(RawMidiEvent::received_at(bytes, 0, t0 + Duration::from_millis(i as u64)));
    }
    producer.close();

    // The worker starts well after the fragments arrived.
    std::thread::sleep(Duration::from_millis(200));
    let worker = spawn_forwarder(consumer, processor(&recorder)).unwrap();
    let p = worker.join().unwrap();
    assert_eq!(p.stats().osc_messages(), 1);
    finish(p);

    let got: Vec<_> = recorder.messages().into_iter().map(|m| m.addr).collect();
    assert_eq!(got, vec!["/qu/channel/2/fader".to_string()]);
}

#[test]
fn worker_drains_queue_after_producer_closes() {
    let recorder = Recorder::default();
    let (producer, consumer) = ingest_queue(32);
    let worker = spawn_forwarder(consumer, processor(&recorder)).unwrap();

    for value in [10u8, 20, 30] {
        producer.push(RawMidiEvent::new(vec![0xB4, 7, value], 0));
    }
    producer.close();

    let p = worker.join().unwrap();
    assert_eq!(p.stats().events(), 3);
    finish(p);

    let got: Vec<_> = recorder.messages().into_iter().map(|m| (m.addr, m.args)).collect();
    assert_eq!(
        got,
        [10, 20, 30]
            .into_iter()
            .map(|v| ("/qu/cc/4/7".to_string(), vec![OscType::Int(v)]))
            .collect::<Vec<_>>()
    );
}
