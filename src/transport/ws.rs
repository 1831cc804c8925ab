use std::io;
use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::{Error as WsError, Message, WebSocket};

use super::{Frame, FrameConn};

const SEND_RETRY_SLEEP: Duration = Duration::from_millis(2);
const SEND_DEADLINE: Duration = Duration::from_secs(10);

fn ws_io_error(context: &str, error: WsError) -> io::Error {
    match error {
        WsError::Io(err) => err,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::ConnectionAborted, format!("{context}: closed"))
        }
        other => io::Error::other(format!("{context}: {other}")),
    }
}

fn is_would_block(error: &WsError) -> bool {
    matches!(error, WsError::Io(err) if err.kind() == io::ErrorKind::WouldBlock)
}

/// Expects the underlying stream to be in nonblocking mode.
impl FrameConn for WebSocket<TcpStream> {
    fn poll_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            match self.read() {
                Ok(Message::Binary(bytes)) => return Ok(Some(Frame::Data(bytes.to_vec()))),
                Ok(Message::Text(text)) => {
                    return Ok(Some(Frame::Data(text.as_str().as_bytes().to_vec())))
                }
                Ok(Message::Ping(payload)) => return Ok(Some(Frame::Ping(payload.to_vec()))),
                Ok(Message::Pong(payload)) => return Ok(Some(Frame::Pong(payload.to_vec()))),
                Ok(Message::Close(_)) => return Ok(Some(Frame::Close)),
                Ok(Message::Frame(_)) => continue,
                Err(err) if is_would_block(&err) => return Ok(None),
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Ok(Some(Frame::Close))
                }
                Err(err) => return Err(ws_io_error("websocket read failed", err)),
            }
        }
    }

    fn send_frame(&mut self, frame: Frame) -> io::Result<()> {
        let message = match frame {
            Frame::Data(data) => Message::binary(data),
            Frame::Ping(payload) => Message::Ping(payload.into()),
            Frame::Pong(payload) => Message::Pong(payload.into()),
            Frame::Close => {
                return match self.close(None) {
                    Ok(()) => self.flush().or_else(|err| {
                        if is_would_block(&err) {
                            Ok(())
                        } else {
                            Err(ws_io_error("websocket close failed", err))
                        }
                    }),
                    Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
                    Err(err) if is_would_block(&err) => Ok(()),
                    Err(err) => Err(ws_io_error("websocket close failed", err)),
                };
            }
        };
        // A WouldBlock from write means the frame is queued; flushing drains it.
        match self.write(message) {
            Ok(()) => {}
            Err(err) if is_would_block(&err) => {}
            Err(err) => return Err(ws_io_error("websocket send failed", err)),
        }
        let deadline = Instant::now() + SEND_DEADLINE;
        loop {
            match self.flush() {
                Ok(()) => return Ok(()),
                Err(err) if is_would_block(&err) && Instant::now() < deadline => {
                    thread::sleep(SEND_RETRY_SLEEP);
                }
                Err(err) => return Err(ws_io_error("websocket flush failed", err)),
            }
        }
    }

    fn shutdown(&mut self) {
        let _ = self.get_mut().shutdown(Shutdown::Both);
    }
}
