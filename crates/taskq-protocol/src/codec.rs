use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for encoding/decoding messages with length-prefixed framing
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [payload]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Need at least 5 bytes for length prefix + message type
        if src.len() < 5 {
            return Ok(None);
        }

        // Read length prefix without consuming
        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }
        if length == 0 {
            return Err(ProtocolError::InvalidMessageType(0));
        }

        // Wait for complete message
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);

        let msg_type_byte = src.get_u8();
        let msg_type = MessageType::from_u8(msg_type_byte)
            .ok_or(ProtocolError::InvalidMessageType(msg_type_byte))?;

        let payload = src.split_to(length - 1);

        let message = match msg_type {
            MessageType::Push => Message::Push(bincode::deserialize(&payload)?),
            MessageType::Pop => Message::Pop(bincode::deserialize(&payload)?),
            MessageType::Depth => Message::Depth(bincode::deserialize(&payload)?),
            MessageType::Ping => Message::Ping(bincode::deserialize(&payload)?),
            MessageType::SubmitTask => Message::SubmitTask(bincode::deserialize(&payload)?),
            MessageType::ListTasks => Message::ListTasks(bincode::deserialize(&payload)?),
            MessageType::ListWorkers => Message::ListWorkers(bincode::deserialize(&payload)?),
            MessageType::Ack => Message::Ack(bincode::deserialize(&payload)?),
            MessageType::Nack => Message::Nack(bincode::deserialize(&payload)?),
            MessageType::Popped => Message::Popped(bincode::deserialize(&payload)?),
            MessageType::QueueDepth => Message::QueueDepth(bincode::deserialize(&payload)?),
            MessageType::Submitted => Message::Submitted(bincode::deserialize(&payload)?),
            MessageType::TaskList => Message::TaskList(bincode::deserialize(&payload)?),
            MessageType::WorkerList => Message::WorkerList(bincode::deserialize(&payload)?),
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = match &item {
            Message::Push(req) => bincode::serialize(req)?,
            Message::Pop(req) => bincode::serialize(req)?,
            Message::Depth(req) => bincode::serialize(req)?,
            Message::Ping(req) => bincode::serialize(req)?,
            Message::SubmitTask(req) => bincode::serialize(req)?,
            Message::ListTasks(req) => bincode::serialize(req)?,
            Message::ListWorkers(req) => bincode::serialize(req)?,
            Message::Ack(resp) => bincode::serialize(resp)?,
            Message::Nack(resp) => bincode::serialize(resp)?,
            Message::Popped(resp) => bincode::serialize(resp)?,
            Message::QueueDepth(resp) => bincode::serialize(resp)?,
            Message::Submitted(resp) => bincode::serialize(resp)?,
            Message::TaskList(resp) => bincode::serialize(resp)?,
            Message::WorkerList(resp) => bincode::serialize(resp)?,
        };

        let total_length = 1 + payload.len(); // message type + payload
        if total_length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(total_length));
        }

        dst.reserve(4 + total_length);
        dst.put_u32(total_length as u32);
        dst.put_u8(item.message_type().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NackKind, PopResponse, PushRequest, SubmitTaskRequest, TaskListResponse};
    use taskq_core::{NewTask, Priority, Task};

    #[test]
    fn test_push_frame_decodes() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let task = Task::new("payload", Priority::Medium);
        let message = Message::Push(PushRequest {
            tier: task.priority,
            data: task.to_bytes().unwrap(),
        });

        codec.encode(message, &mut buffer).unwrap();
        assert_eq!(buffer[4], MessageType::Push.as_u8());

        match codec.decode(&mut buffer).unwrap() {
            Some(Message::Push(req)) => {
                assert_eq!(req.tier, Priority::Medium);
                assert_eq!(Task::from_bytes(&req.data).unwrap(), task);
            }
            other => panic!("Wrong message: {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_pop_and_nack() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        codec
            .encode(Message::Popped(PopResponse { data: None }), &mut buffer)
            .unwrap();
        codec
            .encode(Message::nack(NackKind::Validation, "payload is required"), &mut buffer)
            .unwrap();

        assert!(matches!(
            codec.decode(&mut buffer).unwrap(),
            Some(Message::Popped(PopResponse { data: None }))
        ));
        match codec.decode(&mut buffer).unwrap() {
            Some(Message::Nack(nack)) => {
                assert_eq!(nack.kind, NackKind::Validation);
                assert_eq!(nack.error, "payload is required");
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_submission_keeps_invalid_priority_for_the_server() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let submission = NewTask::new("data", 9);
        codec
            .encode(
                Message::SubmitTask(SubmitTaskRequest {
                    submission: submission.clone(),
                }),
                &mut buffer,
            )
            .unwrap();

        match codec.decode(&mut buffer).unwrap() {
            Some(Message::SubmitTask(req)) => assert_eq!(req.submission, submission),
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_partial_message() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let tasks = vec![Task::new("a", Priority::High), Task::new("b", Priority::Low)];
        codec
            .encode(Message::TaskList(TaskListResponse { tasks, next_offset: None }), &mut buffer)
            .unwrap();

        let full_len = buffer.len();
        let partial = buffer.split_to(full_len / 2);
        let mut partial_buffer = BytesMut::from(&partial[..]);

        assert!(codec.decode(&mut partial_buffer).unwrap().is_none());

        partial_buffer.extend_from_slice(&buffer);
        match codec.decode(&mut partial_buffer).unwrap() {
            Some(Message::TaskList(resp)) => assert_eq!(resp.tasks.len(), 2),
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_type_and_oversized_frames() {
        let mut codec = MessageCodec;

        let mut unknown = BytesMut::new();
        unknown.put_u32(1);
        unknown.put_u8(200);
        assert!(matches!(
            codec.decode(&mut unknown),
            Err(ProtocolError::InvalidMessageType(200))
        ));

        let mut oversized = BytesMut::new();
        oversized.put_u32((MAX_MESSAGE_SIZE + 1) as u32);
        oversized.put_u8(MessageType::Push.as_u8());
        assert!(matches!(
            codec.decode(&mut oversized),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }
}
