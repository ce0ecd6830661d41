use super::context::TrialCtx;
use super::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::geometry::weight::Weight;
use crate::Probability;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::io::Cursor;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;

/// the remote procedure ids of the environment server protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rpc {
    Kill = 0,
    InitialState = 1,
    IsSink = 2,
    ValidActions = 3,
    TransitionDistr = 4,
    SampleTransition = 5,
    Reward = 6,
    SampleContextAndReset = 7,
}

impl TryFrom<i32> for Rpc {
    type Error = Error;
    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Kill),
            1 => Ok(Self::InitialState),
            2 => Ok(Self::IsSink),
            3 => Ok(Self::ValidActions),
            4 => Ok(Self::TransitionDistr),
            5 => Ok(Self::SampleTransition),
            6 => Ok(Self::Reward),
            7 => Ok(Self::SampleContextAndReset),
            other => Err(Error::env(format!("unknown rpc id {}", other))),
        }
    }
}

/// the value travelling with a request or response
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Strings(Vec<String>),
    Doubles(Vec<f64>),
    Distr(Vec<(String, f64)>),
}

impl Payload {
    fn code(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::Strings(_) => 1,
            Self::Doubles(_) => 2,
            Self::Distr(_) => 3,
        }
    }
}

/// one request or response on the wire. layout is little-endian:
/// i32 rpc id, i32 value type, i32 payload length, payload bytes.
/// variable-length data inside the payload is length-prefixed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub rpc: Rpc,
    pub payload: Payload,
}

impl Frame {
    pub fn new(rpc: Rpc, payload: Payload) -> Self {
        Self { rpc, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_payload();
        let mut bytes = Vec::with_capacity(body.len() + 12);
        bytes.write_i32::<LittleEndian>(self.rpc as i32).expect("vec write");
        bytes.write_i32::<LittleEndian>(self.payload.code()).expect("vec write");
        bytes.write_i32::<LittleEndian>(body.len() as i32).expect("vec write");
        bytes.extend(body);
        bytes
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match &self.payload {
            Payload::None => {}
            Payload::Strings(strings) => {
                body.write_i32::<LittleEndian>(strings.len() as i32).expect("vec write");
                for s in strings {
                    body.write_i32::<LittleEndian>(s.len() as i32).expect("vec write");
                    body.extend(s.as_bytes());
                }
            }
            Payload::Doubles(doubles) => {
                body.write_i32::<LittleEndian>(doubles.len() as i32).expect("vec write");
                for &x in doubles {
                    body.write_f64::<LittleEndian>(x).expect("vec write");
                }
            }
            Payload::Distr(entries) => {
                body.write_i32::<LittleEndian>(entries.len() as i32).expect("vec write");
                for (key, p) in entries {
                    body.write_i32::<LittleEndian>(key.len() as i32).expect("vec write");
                    body.extend(key.as_bytes());
                    body.write_f64::<LittleEndian>(*p).expect("vec write");
                }
            }
        }
        body
    }

    /// write one frame to a byte stream
    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        writer
            .write_all(&self.encode())
            .map_err(|e| Error::env(format!("short write: {}", e)))
    }

    /// read one frame from a byte stream
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 12];
        reader
            .read_exact(&mut header)
            .map_err(|e| Error::env(format!("short read: {}", e)))?;
        let mut cursor = Cursor::new(&header[8..12]);
        let payload_len = cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| Error::env(format!("short read: {}", e)))?;
        if payload_len < 0 {
            return Err(Error::env("negative payload length"));
        }
        let mut bytes = header.to_vec();
        bytes.resize(12 + payload_len as usize, 0);
        reader
            .read_exact(&mut bytes[12..])
            .map_err(|e| Error::env(format!("short read: {}", e)))?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let rpc = Rpc::try_from(read_i32(&mut cursor)?)?;
        let value_type = read_i32(&mut cursor)?;
        let payload_len = read_i32(&mut cursor)?;
        if payload_len < 0 || bytes.len() < 12 + payload_len as usize {
            return Err(Error::env("truncated frame"));
        }
        let payload = match value_type {
            0 => Payload::None,
            1 => {
                let count = read_i32(&mut cursor)?;
                let strings = (0..count)
                    .map(|_| read_string(&mut cursor))
                    .collect::<Result<Vec<_>>>()?;
                Payload::Strings(strings)
            }
            2 => {
                let count = read_i32(&mut cursor)?;
                let doubles = (0..count)
                    .map(|_| {
                        cursor
                            .read_f64::<LittleEndian>()
                            .map_err(|e| Error::env(format!("short read: {}", e)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Payload::Doubles(doubles)
            }
            3 => {
                let count = read_i32(&mut cursor)?;
                let entries = (0..count)
                    .map(|_| {
                        let key = read_string(&mut cursor)?;
                        let p = cursor
                            .read_f64::<LittleEndian>()
                            .map_err(|e| Error::env(format!("short read: {}", e)))?;
                        Ok((key, p))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Payload::Distr(entries)
            }
            other => return Err(Error::env(format!("unknown value type {}", other))),
        };
        Ok(Self { rpc, payload })
    }
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    cursor
        .read_i32::<LittleEndian>()
        .map_err(|e| Error::env(format!("short read: {}", e)))
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = read_i32(cursor)?;
    if len < 0 {
        return Err(Error::env("negative string length"));
    }
    let mut buffer = vec![0u8; len as usize];
    cursor
        .read_exact(&mut buffer)
        .map_err(|e| Error::env(format!("short read: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::env(format!("invalid utf8: {}", e)))
}

/// a request/response channel to an environment server. the
/// shared-memory segment with its semaphore pair satisfies this; the
/// in-process loopback below satisfies it too and backs the tests.
pub trait Transport: Send {
    fn call(&mut self, frame: Frame) -> Result<Frame>;
}

/// states and actions that can cross the wire as strings
pub trait Wire: Sized {
    fn to_wire(&self) -> String;
    fn from_wire(s: &str) -> Result<Self>;
}

impl Wire for super::walk::WalkState {
    fn to_wire(&self) -> String {
        let last = match self.last {
            None => "-",
            Some(super::walk::Step::Right) => "r",
            Some(super::walk::Step::Down) => "d",
        };
        format!("{},{},{}", self.x, self.y, last)
    }
    fn from_wire(s: &str) -> Result<Self> {
        let mut parts = s.split(',');
        let mut field = || parts.next().ok_or_else(|| Error::env(format!("bad state: {}", s)));
        let x = field()?.parse::<u32>().map_err(|e| Error::env(format!("bad state: {}", e)))?;
        let y = field()?.parse::<u32>().map_err(|e| Error::env(format!("bad state: {}", e)))?;
        let last = match field()? {
            "-" => None,
            "r" => Some(super::walk::Step::Right),
            "d" => Some(super::walk::Step::Down),
            other => return Err(Error::env(format!("bad direction: {}", other))),
        };
        Ok(Self { x, y, last })
    }
}

impl Wire for super::walk::Step {
    fn to_wire(&self) -> String {
        match self {
            Self::Right => "r".to_string(),
            Self::Down => "d".to_string(),
        }
    }
    fn from_wire(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(Self::Right),
            "d" => Ok(Self::Down),
            other => Err(Error::env(format!("bad action: {}", other))),
        }
    }
}

/// server half: answers protocol frames against a local environment.
/// each worker lane runs its own server so per-lane episode state
/// never races.
pub struct EnvServer<E: Environment>
where
    E::State: Wire,
    E::Action: Wire,
{
    env: Arc<E>,
    ctx: TrialCtx,
    rng: SmallRng,
}

impl<E: Environment> EnvServer<E>
where
    E::State: Wire,
    E::Action: Wire,
{
    pub fn new(env: Arc<E>, seed: u64) -> Result<Self> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let ctx = env.sample_context(0, &mut rng)?;
        Ok(Self { env, ctx, rng })
    }

    pub fn handle(&mut self, frame: Frame) -> Result<Frame> {
        match (frame.rpc, frame.payload) {
            (Rpc::Kill, _) => Ok(Frame::new(Rpc::Kill, Payload::None)),
            (Rpc::InitialState, _) => {
                let state = self.env.initial_state()?;
                Ok(Frame::new(Rpc::InitialState, Payload::Strings(vec![state.to_wire()])))
            }
            (Rpc::IsSink, Payload::Strings(args)) => {
                let state = E::State::from_wire(self.arg(&args, 0)?)?;
                let sink = self.env.is_sink(&state, &self.ctx)?;
                Ok(Frame::new(Rpc::IsSink, Payload::Doubles(vec![sink as i32 as f64])))
            }
            (Rpc::ValidActions, Payload::Strings(args)) => {
                let state = E::State::from_wire(self.arg(&args, 0)?)?;
                let actions = self.env.valid_actions(&state, &self.ctx)?;
                Ok(Frame::new(
                    Rpc::ValidActions,
                    Payload::Strings(actions.iter().map(Wire::to_wire).collect()),
                ))
            }
            (Rpc::TransitionDistr, Payload::Strings(args)) => {
                let state = E::State::from_wire(self.arg(&args, 0)?)?;
                let action = E::Action::from_wire(self.arg(&args, 1)?)?;
                let distribution = self
                    .env
                    .transition_distribution(&state, &action, &self.ctx)?
                    .ok_or_else(|| Error::env("environment cannot enumerate transitions"))?;
                Ok(Frame::new(
                    Rpc::TransitionDistr,
                    Payload::Distr(distribution.into_iter().map(|(s, p)| (s.to_wire(), p)).collect()),
                ))
            }
            (Rpc::SampleTransition, Payload::Strings(args)) => {
                let state = E::State::from_wire(self.arg(&args, 0)?)?;
                let action = E::Action::from_wire(self.arg(&args, 1)?)?;
                let next = self.env.sample_transition(&state, &action, &mut self.ctx)?;
                Ok(Frame::new(Rpc::SampleTransition, Payload::Strings(vec![next.to_wire()])))
            }
            (Rpc::Reward, Payload::Strings(args)) => {
                let state = E::State::from_wire(self.arg(&args, 0)?)?;
                let action = E::Action::from_wire(self.arg(&args, 1)?)?;
                let reward = self.env.mo_reward(&state, &action, &self.ctx)?;
                Ok(Frame::new(Rpc::Reward, Payload::Doubles(reward.into_components())))
            }
            (Rpc::SampleContextAndReset, _) => {
                self.ctx = self.env.sample_context(self.ctx.tid, &mut self.rng)?;
                Ok(Frame::new(
                    Rpc::SampleContextAndReset,
                    Payload::Doubles(self.ctx.weight.components().to_vec()),
                ))
            }
            (rpc, payload) => Err(Error::env(format!(
                "rpc {:?} with mismatched payload type {}",
                rpc,
                payload.code()
            ))),
        }
    }

    fn arg<'a>(&self, args: &'a [String], index: usize) -> Result<&'a str> {
        args.get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::env(format!("rpc missing argument {}", index)))
    }

    /// answer frames from a byte stream until a kill request
    /// arrives. this is the whole server main loop; what carries the
    /// bytes (a pipe, a socket, a shared memory segment) is up to
    /// the caller.
    pub fn serve<R: Read, W: std::io::Write>(&mut self, reader: &mut R, writer: &mut W) -> Result<()> {
        loop {
            let request = Frame::read_from(reader)?;
            let done = request.rpc == Rpc::Kill;
            let response = self.handle(request)?;
            response.write_to(writer)?;
            if done {
                return Ok(());
            }
        }
    }
}

/// a transport that serves frames in-process, exercising the full
/// encode/decode path both ways
pub struct Loopback<E: Environment>
where
    E::State: Wire,
    E::Action: Wire,
{
    server: EnvServer<E>,
}

impl<E: Environment> Loopback<E>
where
    E::State: Wire,
    E::Action: Wire,
{
    pub fn new(env: Arc<E>, seed: u64) -> Result<Self> {
        Ok(Self { server: EnvServer::new(env, seed)? })
    }
}

impl<E: Environment> Transport for Loopback<E>
where
    E::State: Wire,
    E::Action: Wire,
{
    fn call(&mut self, frame: Frame) -> Result<Frame> {
        let request = Frame::decode(&frame.encode())?;
        let response = self.server.handle(request)?;
        Frame::decode(&response.encode())
    }
}

/// client half: an environment whose every operation is one
/// request/response pair against a server process. one transport
/// lane per worker thread; the pool guarantees a thread never shares
/// its lane mid-call.
pub struct RemoteEnv<T: Transport + 'static> {
    dim: usize,
    lanes: Vec<Mutex<T>>,
}

impl<T: Transport + 'static> RemoteEnv<T> {
    pub fn new(dim: usize, lanes: Vec<T>) -> Result<Self> {
        if lanes.is_empty() {
            return Err(Error::config("remote environment needs at least one lane"));
        }
        if dim < 2 {
            return Err(Error::config("reward dimension must be at least 2"));
        }
        Ok(Self { dim, lanes: lanes.into_iter().map(Mutex::new).collect() })
    }

    fn call(&self, tid: usize, frame: Frame) -> Result<Frame> {
        self.lanes[tid % self.lanes.len()]
            .lock()
            .expect("transport lane lock")
            .call(frame)
    }

    fn strings(&self, tid: usize, rpc: Rpc, args: Vec<String>) -> Result<Frame> {
        self.call(tid, Frame::new(rpc, Payload::Strings(args)))
    }

    /// tell every lane's server to shut down
    pub fn kill(&self) -> Result<()> {
        for lane in &self.lanes {
            lane.lock()
                .expect("transport lane lock")
                .call(Frame::new(Rpc::Kill, Payload::None))?;
        }
        Ok(())
    }
}

impl<T: Transport + 'static> Environment for RemoteEnv<T> {
    type State = String;
    type Action = String;

    fn reward_dim(&self) -> usize {
        self.dim
    }

    fn initial_state(&self) -> Result<String> {
        match self.call(0, Frame::new(Rpc::InitialState, Payload::None))?.payload {
            Payload::Strings(mut states) if !states.is_empty() => Ok(states.remove(0)),
            other => Err(Error::env(format!("bad initial_state response: {:?}", other))),
        }
    }

    fn is_sink(&self, state: &String, ctx: &TrialCtx) -> Result<bool> {
        match self.strings(ctx.tid, Rpc::IsSink, vec![state.clone()])?.payload {
            Payload::Doubles(flags) if !flags.is_empty() => Ok(flags[0] != 0.),
            other => Err(Error::env(format!("bad is_sink response: {:?}", other))),
        }
    }

    fn valid_actions(&self, state: &String, ctx: &TrialCtx) -> Result<Vec<String>> {
        match self.strings(ctx.tid, Rpc::ValidActions, vec![state.clone()])?.payload {
            Payload::Strings(actions) => Ok(actions),
            other => Err(Error::env(format!("bad valid_actions response: {:?}", other))),
        }
    }

    fn transition_distribution(
        &self,
        state: &String,
        action: &String,
        ctx: &TrialCtx,
    ) -> Result<Option<Vec<(String, Probability)>>> {
        let frame = self.strings(ctx.tid, Rpc::TransitionDistr, vec![state.clone(), action.clone()])?;
        match frame.payload {
            Payload::Distr(entries) => Ok(Some(entries)),
            other => Err(Error::env(format!("bad distribution response: {:?}", other))),
        }
    }

    fn sample_transition(
        &self,
        state: &String,
        action: &String,
        ctx: &mut TrialCtx,
    ) -> Result<String> {
        let frame = self.strings(ctx.tid, Rpc::SampleTransition, vec![state.clone(), action.clone()])?;
        match frame.payload {
            Payload::Strings(mut states) if !states.is_empty() => Ok(states.remove(0)),
            other => Err(Error::env(format!("bad transition response: {:?}", other))),
        }
    }

    fn mo_reward(&self, state: &String, action: &String, ctx: &TrialCtx) -> Result<Value> {
        let frame = self.strings(ctx.tid, Rpc::Reward, vec![state.clone(), action.clone()])?;
        match frame.payload {
            Payload::Doubles(reward) if reward.len() == self.dim => Ok(Value::from(reward)),
            other => Err(Error::env(format!("bad reward response: {:?}", other))),
        }
    }

    fn sample_context(&self, tid: usize, rng: &mut SmallRng) -> Result<TrialCtx> {
        let frame = self.call(tid, Frame::new(Rpc::SampleContextAndReset, Payload::None))?;
        match frame.payload {
            Payload::Doubles(weight) if weight.len() == self.dim => {
                Ok(TrialCtx::new(tid, Weight::new(weight)?, rng))
            }
            other => Err(Error::env(format!("bad context response: {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::walk::Step;
    use crate::env::walk::Walk;
    use crate::env::walk::WalkState;

    #[test]
    fn frames_round_trip_every_payload_type() {
        let frames = vec![
            Frame::new(Rpc::Kill, Payload::None),
            Frame::new(Rpc::ValidActions, Payload::Strings(vec!["a".into(), "bb".into()])),
            Frame::new(Rpc::Reward, Payload::Doubles(vec![-1.5, 0.25, 1e9])),
            Frame::new(
                Rpc::TransitionDistr,
                Payload::Distr(vec![("0,1,d".into(), 0.75), ("0,0,d".into(), 0.25)]),
            ),
        ];
        for frame in frames {
            assert!(Frame::decode(&frame.encode()).unwrap() == frame);
        }
    }

    #[test]
    fn decoding_garbage_fails_loudly() {
        assert!(Frame::decode(&[1, 2, 3]).is_err());
        let mut bytes = Frame::new(Rpc::Reward, Payload::Doubles(vec![1.])).encode();
        bytes.truncate(14);
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn states_and_actions_round_trip_the_wire() {
        let state = WalkState { x: 3, y: 1, last: Some(Step::Down) };
        assert!(WalkState::from_wire(&state.to_wire()).unwrap() == state);
        let action = Step::Right;
        assert!(Step::from_wire(&action.to_wire()).unwrap() == action);
    }

    #[test]
    fn remote_walk_matches_the_local_walk() {
        let walk = Arc::new(Walk::new(4, 0., false));
        let remote = RemoteEnv::new(
            2,
            vec![Loopback::new(walk.clone(), 42).unwrap()],
        )
        .unwrap();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut ctx = remote.sample_context(0, &mut rng).unwrap();

        let state = remote.initial_state().unwrap();
        assert!(state == walk.initial_state().unwrap().to_wire());
        assert!(!remote.is_sink(&state, &ctx).unwrap());
        let actions = remote.valid_actions(&state, &ctx).unwrap();
        assert!(actions == vec!["r".to_string(), "d".to_string()]);

        let next = remote.sample_transition(&state, &actions[0], &mut ctx).unwrap();
        assert!(next == "1,0,r");
        let reward = remote.mo_reward(&state, &actions[0], &ctx).unwrap();
        assert!(reward.dim() == 2);
        assert!((reward.components()[0] - -0.5).abs() < 1e-12);

        let distribution = remote
            .transition_distribution(&state, &actions[0], &ctx)
            .unwrap()
            .unwrap();
        assert!(distribution.len() == 1);
        assert!((distribution[0].1 - 1.).abs() < 1e-12);
    }

    #[test]
    fn a_server_answers_streamed_frames_until_killed() {
        let walk = Arc::new(Walk::new(4, 0., false));
        let mut server = EnvServer::new(walk, 3).unwrap();
        let mut requests = Vec::new();
        Frame::new(Rpc::InitialState, Payload::None)
            .write_to(&mut requests)
            .unwrap();
        Frame::new(Rpc::ValidActions, Payload::Strings(vec!["0,0,-".into()]))
            .write_to(&mut requests)
            .unwrap();
        Frame::new(Rpc::Kill, Payload::None).write_to(&mut requests).unwrap();

        let mut reader = Cursor::new(requests.as_slice());
        let mut responses = Vec::new();
        server.serve(&mut reader, &mut responses).unwrap();

        let mut replies = Cursor::new(responses.as_slice());
        let first = Frame::read_from(&mut replies).unwrap();
        assert!(first.payload == Payload::Strings(vec!["0,0,-".to_string()]));
        let second = Frame::read_from(&mut replies).unwrap();
        assert!(second.payload == Payload::Strings(vec!["r".to_string(), "d".to_string()]));
        let last = Frame::read_from(&mut replies).unwrap();
        assert!(last.rpc == Rpc::Kill);
    }

    #[test]
    fn remote_contexts_carry_simplex_weights() {
        let walk = Arc::new(Walk::new(4, 0., false));
        let remote = RemoteEnv::new(2, vec![Loopback::new(walk, 1).unwrap()]).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let ctx = remote.sample_context(3, &mut rng).unwrap();
        assert!(ctx.tid == 3);
        assert!((ctx.weight.components().iter().sum::<f64>() - 1.).abs() < 1e-9);
    }
}
