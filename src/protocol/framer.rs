//! Drains a [`Packet`] to an async sink via vectored write, surviving short
//! writes and `EINTR` (the latter is retried transparently by tokio's I/O
//! driver; the former is handled explicitly here via [`IoSlice::advance_slices`]).

use std::io::{self, IoSlice};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire::{Packet, HEADER_LEN};

pub async fn write_framed<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> io::Result<()> {
    let header = packet.encode_header();
    let mut slices = [IoSlice::new(&header), IoSlice::new(&packet.body)];
    let mut bufs: &mut [IoSlice] = &mut slices;

    while !bufs.is_empty() {
        let n = writer.write_vectored(bufs).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write_vectored wrote 0 bytes"));
        }
        IoSlice::advance_slices(&mut bufs, n);
    }
    writer.flush().await
}

/// Reads one framed packet from the wire. Used for the client-to-server
/// direction (opaque input-event blobs); the server side treats the body as
/// opaque and hands it to the external HID injector.
pub async fn read_framed<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Packet> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let (size, kind, keyframe, latency_ms) = Packet::decode_header(&header)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown packet type in header"))?;

    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body).await?;

    Ok(Packet { kind, keyframe, latency_ms, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Wraps an `AsyncWrite` and truncates every vectored write to at most
    /// `chunk` bytes, to exercise the short-write recovery path.
    struct ChunkedWriter<W> {
        inner: W,
        chunk: usize,
    }

    impl<W: AsyncWrite + Unpin> AsyncWrite for ChunkedWriter<W> {
        fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            let n = buf.len().min(this.chunk);
            Pin::new(&mut this.inner).poll_write(cx, &buf[..n])
        }

        fn poll_write_vectored(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            bufs: &[IoSlice<'_>],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            let first = bufs.iter().find(|b| !b.is_empty());
            match first {
                None => Poll::Ready(Ok(0)),
                Some(slice) => {
                    let n = slice.len().min(this.chunk);
                    Pin::new(&mut this.inner).poll_write(cx, &slice[..n])
                }
            }
        }

        fn is_write_vectored(&self) -> bool {
            true
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_flush(cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn round_trips_through_an_in_memory_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let pkt = Packet::video(vec![9, 9, 9, 9, 9, 9, 9], true, 42);
        write_framed(&mut client, &pkt).await.unwrap();
        let decoded = read_framed(&mut server).await.unwrap();
        assert_eq!(decoded, pkt);
    }

    #[tokio::test]
    async fn survives_single_byte_short_writes() {
        let (client, mut server) = tokio::io::duplex(8192);
        let mut chunked = ChunkedWriter { inner: client, chunk: 1 };
        let pkt = Packet::audio_data(vec![1, 2, 3, 4, 5, 6, 7, 8], 3);

        let pkt2 = pkt.clone();
        let writer = tokio::spawn(async move {
            write_framed(&mut chunked, &pkt2).await.unwrap();
        });
        let decoded = read_framed(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(decoded, pkt);
    }

    #[tokio::test]
    async fn sequence_of_records_round_trips_in_order() {
        let (mut client, mut server) = tokio::io::duplex(16384);
        let packets = vec![
            Packet::video(vec![1, 2, 3], true, 0),
            Packet::audio_config("44100:FL,FR".to_string()),
            Packet::audio_data(vec![0, 0, 0, 0], 5),
            Packet::input_event(vec![7, 8]),
        ];
        for pkt in &packets {
            write_framed(&mut client, pkt).await.unwrap();
        }
        for expected in &packets {
            let decoded = read_framed(&mut server).await.unwrap();
            assert_eq!(&decoded, expected);
        }
    }
}
