//! Loopback demo: fragment frames, drop some datagrams on purpose and watch
//! the receiver reassemble what survives.
//!
//! Run with:
//!   cargo run --example loopback

use std::thread;
use std::time::Duration;

use silkcast::client::{Decoder, UdpReceiver, UdpStreamConfig};
use silkcast::frame::{FeedbackSink, FragmentWriter, VideoCodec};
use silkcast::transport::DatagramSocket;

/// Prints instead of calling a service.
struct PrintFeedback;

impl FeedbackSink for PrintFeedback {
    type Error = std::convert::Infallible;

    fn request_reference_frame(&mut self) -> Result<(), Self::Error> {
        eprintln!("-> would request a reference frame");
        Ok(())
    }
}

/// Forwards datagrams to a socket, skipping every `drop_every`-th one.
struct LossySink {
    socket: DatagramSocket,
    sent: usize,
    drop_every: usize,
}

impl silkcast::frame::DatagramSink for LossySink {
    fn send_datagram(&mut self, datagram: &[u8]) -> std::io::Result<()> {
        self.sent += 1;
        if self.sent % self.drop_every == 0 {
            return Ok(());
        }
        self.socket
            .send(datagram)
            .map(|_| ())
            .map_err(|err| std::io::Error::other(err.to_string()))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Gap feedback only runs for codecs with reference frames.
    let config = UdpStreamConfig {
        bind_addr: "127.0.0.1:0".parse()?,
        codec: VideoCodec::H264,
        recv_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let mut receiver = UdpReceiver::listen(&config, Decoder::Identity, Some(PrintFeedback))?;
    eprintln!("Receiving on {}", receiver.local_addr());

    let socket = DatagramSocket::bind("127.0.0.1:0".parse()?)?;
    socket.connect(receiver.local_addr())?;
    let mut writer = FragmentWriter::with_mtu(
        LossySink {
            socket,
            sent: 0,
            drop_every: 7,
        },
        256,
    );

    for i in 0..20u8 {
        let frame = vec![i; 100 + usize::from(i) * 60];
        writer.send_frame(&frame)?;
        thread::sleep(Duration::from_millis(20));
        if let Some(image) = receiver.read_latest() {
            eprintln!("frame {i:>2}: latest is {} bytes", image.data.len());
        }
    }

    thread::sleep(Duration::from_millis(200));
    receiver.close();
    eprintln!("{}", receiver.stats().to_json()?);
    Ok(())
}
