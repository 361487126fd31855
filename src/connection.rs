//! Sans-io connection state machine.
//!
//! [`Connection`] owns the framer, the decode state and the statement
//! cache. It never touches a socket: the caller moves bytes between its
//! transport and [`get_buffer`][Connection::get_buffer] /
//! [`buffer_updated`][Connection::buffer_updated], and sends the
//! [`Bytes`] returned by [`execute`][Connection::execute] and friends.
use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::{
    common::verbose,
    encode::{Encoded, EncodeError, Param},
    error::{Result, UnsupportedAuth, UnsupportedEncoding},
    framer::Framer,
    protocol::{
        backend::{
            Authentication, BackendKeyData, BackendMessage, DataRow, NotificationResponse,
        },
        frontend, Oid, PgFormat, ProtocolError, ResultFormat, ServerError,
    },
    result::{FieldDescriptor, QueryOutcome, Row, StatementResult},
    statement::{
        CachedStatement, CacheKey, StatementCache, StatementName, DEFAULT_CACHE_SIZE,
        DEFAULT_PREPARE_THRESHOLD,
    },
    types::{self, DecodeContext, Decoder},
};

/// Statement cache tuning.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Executions of the same statement before it is prepared server
    /// side. `0` disables statement caching.
    pub prepare_threshold: u32,
    /// Maximum number of cached statements.
    pub cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { prepare_threshold: DEFAULT_PREPARE_THRESHOLD, cache_size: DEFAULT_CACHE_SIZE }
    }
}

/// Connection parameters for the startup packet.
#[derive(Clone, Copy, Debug, Default)]
pub struct StartupOptions<'a> {
    pub user: &'a str,
    pub database: Option<&'a str>,
    pub application_name: Option<&'a str>,
    pub timezone: Option<&'a str>,
}

/// State of one query cycle, from execute until `ReadyForQuery`.
struct Cycle {
    results: Vec<StatementResult>,
    fields: Option<Arc<[FieldDescriptor]>>,
    decoders: Option<Arc<[Decoder]>>,
    rows: Option<Vec<Row>>,
    error: Option<ServerError>,
    result_format: PgFormat,
    raw_result: bool,
    cache_key: Option<CacheKey>,
    cache_hit: bool,
}

impl Cycle {
    fn new(result_format: PgFormat) -> Self {
        Self {
            results: vec![],
            fields: None,
            decoders: None,
            rows: None,
            error: None,
            result_format,
            raw_result: false,
            cache_key: None,
            cache_hit: false,
        }
    }
}

/// A close scheduled for the start of the next query cycle.
struct PendingClose {
    name: StatementName,
    /// Set when the cache entry outlives the server side statement.
    key: Option<CacheKey>,
}

/// Protocol state of a single postgres session.
pub struct Connection {
    framer: Framer,
    config: Config,
    cache: StatementCache,
    overrides: HashMap<Oid, (Decoder, Decoder)>,
    ctx: DecodeContext,
    server_params: HashMap<String, String>,
    transaction_status: Option<u8>,
    backend_key: Option<BackendKeyData>,
    auth_request: Option<Authentication>,
    notifications: Vec<NotificationResponse>,
    pending_close: Option<PendingClose>,
    cycle: Option<Cycle>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Connection {
    pub fn new(config: Config) -> Self {
        Self {
            framer: Framer::new(),
            cache: StatementCache::new(config.cache_size),
            config,
            overrides: HashMap::new(),
            ctx: DecodeContext::default(),
            server_params: HashMap::new(),
            transaction_status: None,
            backend_key: None,
            auth_request: None,
            notifications: vec![],
            pending_close: None,
            cycle: None,
        }
    }

    /// Spare buffer space to read transport bytes into.
    pub fn get_buffer(&mut self) -> &mut [u8] {
        self.framer.get_buffer()
    }

    /// Process `read` bytes written into [`get_buffer`][Connection::get_buffer].
    ///
    /// Returns the outcome when a query cycle completed. Call again with
    /// `0` to continue processing already buffered bytes.
    pub fn buffer_updated(&mut self, read: usize) -> Result<Option<QueryOutcome>> {
        self.framer.buffer_updated(read);
        while let Some(frame) = self.framer.next_frame()? {
            let message = BackendMessage::decode(frame.tag, frame.body)?;
            if let Some(outcome) = self.handle_message(message)? {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// The startup packet. Begins a cycle which completes at the first
    /// `ReadyForQuery`.
    pub fn startup_message(&mut self, options: StartupOptions<'_>) -> Result<Bytes> {
        self.check_idle()?;
        let mut buf = BytesMut::new();
        frontend::Startup {
            user: options.user,
            database: options.database,
            application_name: options.application_name,
            timezone: options.timezone,
        }
        .write(&mut buf);
        self.cycle = Some(Cycle::new(PgFormat::Text));
        Ok(buf.freeze())
    }

    /// Answer an authentication request, cleartext or pre-hashed.
    pub fn password_message(&mut self, password: &str) -> Bytes {
        let mut buf = BytesMut::new();
        frontend::write(frontend::PasswordMessage { password }, &mut buf);
        self.auth_request = None;
        buf.freeze()
    }

    pub fn terminate_message(&self) -> Bytes {
        let mut buf = BytesMut::new();
        frontend::write(frontend::Terminate, &mut buf);
        buf.freeze()
    }

    /// Cancel packet for a fresh companion connection, `None` before the
    /// server shared its key.
    pub fn cancel_message(&self) -> Option<Bytes> {
        let key = self.backend_key?;
        let mut buf = BytesMut::new();
        frontend::CancelRequest { process_id: key.process_id, secret_key: key.secret_key }
            .write(&mut buf);
        Some(buf.freeze())
    }

    /// Encode one query cycle.
    ///
    /// Statements without parameters run over the simple protocol until
    /// the cache promotes them. `raw_result` skips value decoding and
    /// yields text or raw bytes per column.
    pub fn execute(
        &mut self,
        sql: &str,
        params: &[Param<'_>],
        result_format: ResultFormat,
        raw_result: bool,
    ) -> Result<Bytes> {
        self.check_idle()?;
        if params.len() > u16::MAX as usize {
            return Err(EncodeError::TooManyParams(params.len()).into());
        }
        // the parse message must fit its length field
        if sql.len() as u64 + 64 > i32::MAX as u64 {
            return Err(EncodeError::StatementTooLong.into());
        }
        let encoded = params.iter().map(Param::encode).collect::<Result<Vec<_>, _>>()?;
        let param_oids: Box<[Oid]> = encoded.iter().map(Encoded::oid).collect();

        let cache_key = (self.config.prepare_threshold > 0).then(|| CacheKey {
            sql: sql.into(),
            param_oids: param_oids.clone(),
        });
        let mut cache_hit = false;
        let mut prepared = false;
        let mut name = StatementName::UNNAMED;
        let mut cached_fields = None;
        let mut cached_decoders = None;
        if let Some(key) = &cache_key {
            if let Some(entry) = self.cache.peek_mut(key) {
                cache_hit = true;
                // a pending close makes the server side name unusable
                let usable = match &self.pending_close {
                    Some(pending) => pending.name != entry.name,
                    None => true,
                };
                if entry.prepared && usable {
                    prepared = true;
                    name = entry.name;
                    cached_fields = entry.fields.clone();
                    cached_decoders = Some(entry.decoders.clone());
                } else if !entry.prepared && entry.num_executed >= self.config.prepare_threshold {
                    name = entry.name;
                }
            }
        }

        let simple = params.is_empty()
            && !prepared
            && name.is_unnamed()
            && !matches!(result_format, ResultFormat::Binary);
        let format = result_format.resolve(!simple);

        let mut buf = BytesMut::new();
        if let Some(pending) = &self.pending_close {
            verbose!("closing statement {}", pending.name);
            frontend::write(frontend::Close { kind: b'S', name: pending.name.as_str() }, &mut buf);
        }
        if simple {
            frontend::write(frontend::Query { sql }, &mut buf);
        } else {
            if !prepared {
                frontend::write(
                    frontend::Parse { name: name.as_str(), sql, param_oids: &param_oids },
                    &mut buf,
                );
            }
            let bind = frontend::Bind {
                portal: "",
                name: name.as_str(),
                params: &encoded,
                result_format: format,
            };
            use frontend::FrontendProtocol;
            if bind.size_hint() as u64 + 4 > i32::MAX as u64 {
                return Err(EncodeError::MessageTooLong.into());
            }
            frontend::write(bind, &mut buf);
            if !prepared {
                frontend::write(frontend::Describe { kind: b'P', name: "" }, &mut buf);
            }
            frontend::write(frontend::Execute { portal: "", max_rows: 0 }, &mut buf);
            frontend::write(frontend::Sync, &mut buf);
        }

        // no describe phase for prepared statements, seed row state from
        // the cache
        let mut cycle = Cycle::new(format);
        cycle.raw_result = raw_result;
        cycle.cache_key = cache_key;
        cycle.cache_hit = cache_hit;
        if prepared {
            if let Some(fields) = cached_fields {
                let cached = cached_decoders.unwrap_or_default();
                let cached = match (raw_result, format) {
                    (true, _) => None,
                    (false, PgFormat::Text) => cached.text,
                    (false, PgFormat::Binary) => cached.binary,
                };
                let decoders =
                    cached.unwrap_or_else(|| self.build_decoders(&fields, format, raw_result));
                cycle.fields = Some(fields);
                cycle.decoders = Some(decoders);
                cycle.rows = Some(vec![]);
            }
        }
        self.cycle = Some(cycle);
        Ok(buf.freeze())
    }

    /// Override the decoders of a type oid for this connection.
    pub fn register_decoders(&mut self, type_oid: Oid, text: Decoder, binary: Decoder) {
        self.overrides.insert(type_oid, (text, binary));
    }

    /// Latest value of a reported run-time parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    /// Transaction status from the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> Option<u8> {
        self.transaction_status
    }

    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.backend_key
    }

    /// Authentication request awaiting a password message.
    pub fn auth_request(&self) -> Option<&Authentication> {
        self.auth_request.as_ref()
    }

    /// Drain buffered `NOTIFY` payloads.
    pub fn take_notifications(&mut self) -> Vec<NotificationResponse> {
        std::mem::take(&mut self.notifications)
    }

    fn check_idle(&self) -> Result<()> {
        match self.cycle.is_none() {
            true => Ok(()),
            false => Err(ProtocolError::invalid("a query cycle is already in progress").into()),
        }
    }

    fn handle_message(&mut self, message: BackendMessage) -> Result<Option<QueryOutcome>> {
        use BackendMessage::*;
        match message {
            Authentication(auth) => self.handle_auth(auth)?,
            BackendKeyData(key) => self.backend_key = Some(key),
            ParameterStatus(status) => self.handle_parameter_status(&status.name, &status.value)?,
            NoticeResponse(notice) => log::warn!("{}", notice.0),
            NotificationResponse(notification) => self.notifications.push(notification),
            NegotiateProtocolVersion(negotiate) => {
                log::warn!("server downgraded to protocol 3.{}", negotiate.minor_version)
            }
            ParseComplete(_) => self.handle_parse_complete()?,
            BindComplete(_) => {}
            CloseComplete(_) => self.handle_close_complete()?,
            // only sent for a statement describe, which never leaves here
            ParameterDescription(_) => {}
            NoData(_) => {}
            EmptyQueryResponse(_) => {}
            PortalSuspended(_) => {}
            RowDescription(desc) => self.handle_row_description(desc.fields)?,
            DataRow(row) => self.handle_data_row(row)?,
            CommandComplete(complete) => self.handle_command_complete(complete.tag.as_str())?,
            ErrorResponse(err) => self.handle_error(err.0)?,
            ReadyForQuery(ready) => return self.handle_ready(ready.status).map(Some),
        }
        Ok(None)
    }

    fn handle_auth(&mut self, auth: Authentication) -> Result<()> {
        match auth {
            Authentication::Ok => self.auth_request = None,
            Authentication::CleartextPassword | Authentication::MD5Password { .. } => {
                self.auth_request = Some(auth);
            }
            _ => return Err(UnsupportedAuth.into()),
        }
        Ok(())
    }

    fn handle_parameter_status(&mut self, name: &str, value: &str) -> Result<()> {
        verbose!("parameter {name} = {value}");
        match name {
            "client_encoding" if !value.eq_ignore_ascii_case("UTF8") => {
                return Err(UnsupportedEncoding.into());
            }
            "DateStyle" => self.ctx.iso_dates = value.starts_with("ISO"),
            "IntervalStyle" => self.ctx.postgres_intervals = value == "postgres",
            // only fixed offset zones resolve, named zones decode in utc
            "TimeZone" => self.ctx.tz_offset = types::datetime::fixed_offset(value),
            _ => {}
        }
        self.server_params.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn handle_parse_complete(&mut self) -> Result<()> {
        let cycle = self
            .cycle
            .as_ref()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'1', "idle"))?;
        if let Some(key) = &cycle.cache_key {
            if let Some(entry) = self.cache.peek_mut(key) {
                if entry.num_executed >= self.config.prepare_threshold {
                    entry.prepared = true;
                }
            }
        }
        Ok(())
    }

    fn handle_close_complete(&mut self) -> Result<()> {
        let pending = self
            .pending_close
            .take()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'3', "no close pending"))?;
        if let Some(key) = pending.key {
            // the cache entry outlived the statement, prepare it anew
            if let Some(entry) = self.cache.peek_mut(&key) {
                entry.reset();
            }
        }
        Ok(())
    }

    fn handle_row_description(&mut self, fields: Vec<FieldDescriptor>) -> Result<()> {
        let cycle = self
            .cycle
            .as_mut()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'T', "idle"))?;
        let fields: Arc<[FieldDescriptor]> = fields.into();
        let decoders = match cycle.raw_result {
            true => fields.iter().map(|_| types::raw_decoder(cycle.result_format)).collect(),
            false => {
                let overrides = &self.overrides;
                fields
                    .iter()
                    .map(|field| {
                        let (text, binary) = overrides
                            .get(&field.type_oid)
                            .copied()
                            .unwrap_or_else(|| types::decoders(field.type_oid));
                        match cycle.result_format {
                            PgFormat::Text => text,
                            PgFormat::Binary => binary,
                        }
                    })
                    .collect::<Arc<[Decoder]>>()
            }
        };
        if let Some(key) = &cycle.cache_key {
            if let Some(entry) = self.cache.peek_mut(key) {
                if entry.prepared {
                    entry.fields = Some(fields.clone());
                    if !cycle.raw_result {
                        match cycle.result_format {
                            PgFormat::Text => entry.decoders.text = Some(decoders.clone()),
                            PgFormat::Binary => entry.decoders.binary = Some(decoders.clone()),
                        }
                    }
                }
            }
        }
        cycle.fields = Some(fields);
        cycle.decoders = Some(decoders);
        cycle.rows = Some(vec![]);
        Ok(())
    }

    fn handle_data_row(&mut self, row: DataRow) -> Result<()> {
        let cycle = self
            .cycle
            .as_mut()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'D', "idle"))?;
        let decoders = cycle
            .decoders
            .as_ref()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'D', "no row description"))?;
        if row.columns as usize != decoders.len() {
            return Err(ProtocolError::invalid(format!(
                "unexpected number of row values: {} instead of {}",
                row.columns,
                decoders.len(),
            ))
            .into());
        }
        let mut values = Vec::with_capacity(decoders.len());
        let mut rest = &row.body[..];
        for decoder in decoders.iter() {
            let Some((head, tail)) = rest.split_first_chunk::<4>() else {
                return Err(ProtocolError::truncated(b'D').into());
            };
            let len = i32::from_be_bytes(*head);
            rest = tail;
            if len == -1 {
                values.push(crate::types::Value::Null);
                continue;
            }
            let len = usize::try_from(len)
                .map_err(|_| ProtocolError::invalid("negative row value length"))?;
            if len > rest.len() {
                return Err(ProtocolError::invalid("row value exceeds its message").into());
            }
            values.push(decoder(&self.ctx, &rest[..len])?);
            rest = &rest[len..];
        }
        if !rest.is_empty() {
            return Err(ProtocolError::trailing(b'D').into());
        }
        cycle
            .rows
            .as_mut()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'D', "no row description"))?
            .push(Row::new(values));
        Ok(())
    }

    fn handle_command_complete(&mut self, tag: &str) -> Result<()> {
        let cycle = self
            .cycle
            .as_mut()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'C', "idle"))?;
        verbose!("command complete: {tag}");
        if matches!(tag, "DISCARD ALL" | "DEALLOCATE ALL") {
            // the server just dropped every prepared statement
            self.cache.clear();
        }
        cycle.results.push(StatementResult {
            fields: cycle.fields.take(),
            rows: cycle.rows.take(),
            tag: tag.to_owned().into(),
        });
        cycle.decoders = None;
        Ok(())
    }

    fn handle_error(&mut self, err: ServerError) -> Result<()> {
        if err.is_fatal() {
            return Err(err.into());
        }
        match &mut self.cycle {
            Some(cycle) => cycle.error.get_or_insert(err),
            None => {
                log::warn!("server error outside a query cycle: {err}");
                return Ok(());
            }
        };
        Ok(())
    }

    fn handle_ready(&mut self, status: u8) -> Result<QueryOutcome> {
        self.transaction_status = Some(status);
        let mut cycle = self
            .cycle
            .take()
            .ok_or_else(|| ProtocolError::unexpected_phase(b'Z', "idle"))?;
        self.update_cache(&mut cycle);
        Ok(match cycle.error.take() {
            Some(err) => QueryOutcome::Failed(err),
            None => QueryOutcome::Complete(cycle.results),
        })
    }

    /// Cache bookkeeping at the end of a cycle.
    fn update_cache(&mut self, cycle: &mut Cycle) {
        let Some(key) = cycle.cache_key.take() else { return };
        if cycle.cache_hit {
            match &cycle.error {
                None => {
                    if let Some(entry) = self.cache.touch(&key) {
                        if !entry.prepared {
                            entry.num_executed += 1;
                        }
                    }
                }
                Some(err) => {
                    let Some(entry) = self.cache.peek_mut(&key) else { return };
                    if !entry.prepared {
                        return;
                    }
                    // an invalid statement name means the server already
                    // lost the statement
                    match err.code.as_str() {
                        "26000" => entry.reset(),
                        _ => {
                            let name = entry.name;
                            self.pending_close = Some(PendingClose { name, key: Some(key) });
                        }
                    }
                }
            }
            return;
        }
        // cache only single statement queries which keep the cache valid
        let cacheable = cycle.error.is_none()
            && cycle.results.len() == 1
            && !matches!(cycle.results[0].tag(), "DISCARD ALL" | "DEALLOCATE ALL");
        if !cacheable {
            return;
        }
        let slot = match self.cache.is_full() {
            true => {
                let evicted = self.cache.pop_lru();
                let Some(evicted) = evicted else { return };
                if evicted.prepared {
                    self.pending_close =
                        Some(PendingClose { name: evicted.name, key: None });
                }
                evicted.slot
            }
            false => self.cache.len() as u16,
        };
        self.cache.insert(key, CachedStatement::new(slot));
    }

    fn build_decoders(
        &self,
        fields: &[FieldDescriptor],
        format: PgFormat,
        raw_result: bool,
    ) -> Arc<[Decoder]> {
        fields
            .iter()
            .map(|field| {
                if raw_result {
                    return types::raw_decoder(format);
                }
                let (text, binary) = self
                    .overrides
                    .get(&field.type_oid)
                    .copied()
                    .unwrap_or_else(|| types::decoders(field.type_oid));
                match format {
                    PgFormat::Text => text,
                    PgFormat::Binary => binary,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{oid, Value};

    fn msg(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(body.len() as u32 + 4).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn feed(conn: &mut Connection, bytes: &[u8]) -> Result<Option<QueryOutcome>> {
        let mut fed = 0;
        while fed < bytes.len() {
            let buf = conn.get_buffer();
            let n = buf.len().min(bytes.len() - fed);
            buf[..n].copy_from_slice(&bytes[fed..fed + n]);
            fed += n;
            if let Some(outcome) = conn.buffer_updated(n)? {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    fn row_description(fields: &[(&str, Oid, i16)]) -> Vec<u8> {
        let mut body = (fields.len() as u16).to_be_bytes().to_vec();
        for (name, type_oid, format) in fields {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(&0u32.to_be_bytes());
            body.extend_from_slice(&0i16.to_be_bytes());
            body.extend_from_slice(&type_oid.to_be_bytes());
            body.extend_from_slice(&4i16.to_be_bytes());
            body.extend_from_slice(&(-1i32).to_be_bytes());
            body.extend_from_slice(&format.to_be_bytes());
        }
        msg(b'T', &body)
    }

    fn data_row(values: &[Option<&[u8]>]) -> Vec<u8> {
        let mut body = (values.len() as u16).to_be_bytes().to_vec();
        for value in values {
            match value {
                None => body.extend_from_slice(&(-1i32).to_be_bytes()),
                Some(value) => {
                    body.extend_from_slice(&(value.len() as i32).to_be_bytes());
                    body.extend_from_slice(value);
                }
            }
        }
        msg(b'D', &body)
    }

    fn command_complete(tag: &str) -> Vec<u8> {
        let mut body = tag.as_bytes().to_vec();
        body.push(0);
        msg(b'C', &body)
    }

    fn ready(status: u8) -> Vec<u8> {
        msg(b'Z', &[status])
    }

    fn error_response(severity: &str, code: &str, message: &str) -> Vec<u8> {
        let mut body = vec![];
        for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', message)] {
            body.push(field);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
        }
        body.push(0);
        msg(b'E', &body)
    }

    fn parameter_status(name: &str, value: &str) -> Vec<u8> {
        let mut body = name.as_bytes().to_vec();
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
        msg(b'S', &body)
    }

    fn stream(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn startup_cycle() {
        let mut conn = Connection::default();
        let packet = conn.startup_message(StartupOptions { user: "alice", ..Default::default() })
            .unwrap();
        assert_eq!(&packet[4..8], 196_608u32.to_be_bytes().as_slice());
        let mut key = 42i32.to_be_bytes().to_vec();
        key.extend_from_slice(&7i32.to_be_bytes());
        let backend = stream(&[
            msg(b'R', &0i32.to_be_bytes()),
            parameter_status("client_encoding", "UTF8"),
            parameter_status("DateStyle", "ISO, MDY"),
            msg(b'K', &key),
            ready(b'I'),
        ]);
        let outcome = feed(&mut conn, &backend).unwrap().unwrap();
        assert!(matches!(outcome, QueryOutcome::Complete(results) if results.is_empty()));
        assert_eq!(conn.backend_key().unwrap().process_id, 42);
        assert_eq!(conn.parameter("DateStyle"), Some("ISO, MDY"));
        assert_eq!(conn.transaction_status(), Some(b'I'));
    }

    #[test]
    fn simple_query_cycle() {
        let mut conn = Connection::default();
        let bytes = conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
        assert_eq!(bytes[0], b'Q');
        let backend = stream(&[
            row_description(&[("one", oid::INT4, 0)]),
            data_row(&[Some(b"1")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]);
        let results = feed(&mut conn, &backend).unwrap().unwrap().into_result().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tag(), "SELECT 1");
        assert_eq!(results[0].rows()[0].get(0), Some(&Value::Int4(1)));
    }

    #[test]
    fn extended_query_cycle() {
        let mut conn = Connection::default();
        let bytes = conn
            .execute("SELECT $1::int4", &[Param::Int(5)], ResultFormat::Default, false)
            .unwrap();
        assert_eq!(bytes[0], b'P');
        assert_eq!(&bytes[bytes.len() - 5..], b"S\0\0\0\x04");
        let backend = stream(&[
            msg(b'1', &[]),
            msg(b'2', &[]),
            row_description(&[("int4", oid::INT4, 1)]),
            data_row(&[Some(&5i32.to_be_bytes())]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]);
        let results = feed(&mut conn, &backend).unwrap().unwrap().into_result().unwrap();
        assert_eq!(results[0].rows()[0].get(0), Some(&Value::Int4(5)));
    }

    #[test]
    fn null_and_raw_values() {
        let mut conn = Connection::default();
        conn.execute("SELECT NULL, 2", &[], ResultFormat::Default, true).unwrap();
        let backend = stream(&[
            row_description(&[("a", oid::INT4, 0), ("b", oid::INT4, 0)]),
            data_row(&[None, Some(b"2")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]);
        let results = feed(&mut conn, &backend).unwrap().unwrap().into_result().unwrap();
        let row = &results[0].rows()[0];
        assert_eq!(row.get(0), Some(&Value::Null));
        // raw results skip the registered decoders
        assert_eq!(row.get(1), Some(&Value::Text("2".into())));
    }

    #[test]
    fn zero_read_resumes_after_outcome() {
        let mut conn = Connection::default();
        conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
        let mut notification = 42i32.to_be_bytes().to_vec();
        notification.extend_from_slice(b"chan\0payload\0");
        let backend = stream(&[
            command_complete("SELECT 0"),
            ready(b'I'),
            msg(b'A', &notification),
        ]);
        let outcome = feed(&mut conn, &backend).unwrap().unwrap();
        assert!(matches!(outcome, QueryOutcome::Complete(_)));
        // the notification arrived behind the outcome and is still buffered
        assert!(conn.take_notifications().is_empty());
        assert!(conn.buffer_updated(0).unwrap().is_none());
        let notifications = conn.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].channel.as_str(), "chan");
    }

    #[test]
    fn registered_hstore_decoders() {
        const HSTORE: Oid = 16_435;
        let mut conn = Connection::default();
        let (text, binary) = types::hstore_decoders();
        conn.register_decoders(HSTORE, text, binary);
        conn.execute("SELECT tags FROM items", &[], ResultFormat::Default, false).unwrap();
        let backend = stream(&[
            row_description(&[("tags", HSTORE, 0)]),
            data_row(&[Some(b"\"a\"=>\"1\", \"b\"=>NULL")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]);
        let results = feed(&mut conn, &backend).unwrap().unwrap().into_result().unwrap();
        assert_eq!(
            results[0].rows()[0].get(0),
            Some(&Value::Hstore(vec![
                ("a".into(), Some("1".into())),
                ("b".into(), None),
            ])),
        );
    }

    /// Message tags of an encoded frontend byte sequence.
    fn frontend_tags(bytes: &[u8]) -> Vec<u8> {
        let mut tags = vec![];
        let mut pos = 0;
        while pos < bytes.len() {
            tags.push(bytes[pos]);
            let len = u32::from_be_bytes(bytes[pos + 1..pos + 5].try_into().unwrap()) as usize;
            pos += 1 + len;
        }
        tags
    }

    /// Run a full parameterless query cycle, answering whatever messages
    /// the connection sent, and return the frontend bytes.
    fn drive(conn: &mut Connection, sql: &str) -> Bytes {
        let bytes = conn.execute(sql, &[], ResultFormat::Default, false).unwrap();
        let tags = frontend_tags(&bytes);
        let simple = tags.contains(&b'Q');
        let mut backend = vec![];
        if tags.contains(&b'C') {
            backend.push(msg(b'3', &[]));
        }
        if tags.contains(&b'P') {
            backend.push(msg(b'1', &[]));
        }
        if !simple {
            backend.push(msg(b'2', &[]));
        }
        // a bind without describe reuses the cached row description
        if simple || tags.contains(&b'D') {
            let format = if simple { 0 } else { 1 };
            backend.push(row_description(&[("n", oid::INT4, format)]));
        }
        let value: &[u8] = match simple {
            true => b"7",
            false => &7i32.to_be_bytes(),
        };
        backend.push(data_row(&[Some(value)]));
        backend.push(command_complete("SELECT 1"));
        backend.push(ready(b'I'));
        let results = feed(conn, &stream(&backend)).unwrap().unwrap().into_result().unwrap();
        assert_eq!(results[0].rows()[0].get(0), Some(&Value::Int4(7)));
        bytes
    }

    #[test]
    fn statement_promotion() {
        let mut conn = Connection::new(Config { prepare_threshold: 2, cache_size: 16 });
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'Q');
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'Q');
        // third execution reaches the threshold and parses a named statement
        let bytes = drive(&mut conn, "SELECT 7");
        assert_eq!(bytes[0], b'P');
        assert!(bytes.windows(8).any(|window| window == b"_pw_0000"));
        // prepared statements bind directly
        let bytes = drive(&mut conn, "SELECT 7");
        assert_eq!(bytes[0], b'B');
    }

    #[test]
    fn eviction_schedules_close() {
        let mut conn = Connection::new(Config { prepare_threshold: 1, cache_size: 1 });
        drive(&mut conn, "SELECT 7");
        // second execution prepares the statement
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'P');
        // another statement evicts it from the full cache
        assert_eq!(drive(&mut conn, "SELECT 8 - 1")[0], b'Q');
        // the next cycle closes the evicted statement first
        let bytes = drive(&mut conn, "SELECT 8 - 1");
        assert_eq!(bytes[0], b'C');
        assert!(bytes.windows(8).any(|window| window == b"_pw_0000"));
        // the close completed, nothing left to flush
        assert_ne!(drive(&mut conn, "SELECT 8 - 1")[0], b'C');
    }

    #[test]
    fn failed_query_reported_at_ready() {
        let mut conn = Connection::default();
        conn.execute("SELECT nope", &[], ResultFormat::Default, false).unwrap();
        let backend = stream(&[
            error_response("ERROR", "42703", "column \"nope\" does not exist"),
            ready(b'I'),
        ]);
        let outcome = feed(&mut conn, &backend).unwrap().unwrap();
        let QueryOutcome::Failed(err) = outcome else { panic!("expected failure") };
        assert_eq!(err.code.as_str(), "42703");
        // the connection is usable again
        conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
    }

    #[test]
    fn fatal_error_propagates() {
        let mut conn = Connection::default();
        conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
        let backend = error_response("FATAL", "57P01", "terminating connection");
        let err = feed(&mut conn, &backend).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Server(_)));
    }

    #[test]
    fn invalid_statement_name_resets_the_entry() {
        let mut conn = Connection::new(Config { prepare_threshold: 1, cache_size: 16 });
        drive(&mut conn, "SELECT 7");
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'P');
        // the server lost the statement, e.g. after a connection pooler
        // swapped sessions
        let bytes = conn.execute("SELECT 7", &[], ResultFormat::Default, false).unwrap();
        assert_eq!(bytes[0], b'B');
        let backend = stream(&[
            error_response("ERROR", "26000", "prepared statement does not exist"),
            ready(b'I'),
        ]);
        let outcome = feed(&mut conn, &backend).unwrap().unwrap();
        assert!(matches!(outcome, QueryOutcome::Failed(_)));
        // no close message, the entry starts over and re-prepares
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'Q');
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'P');
    }

    #[test]
    fn discard_all_clears_the_cache() {
        let mut conn = Connection::new(Config { prepare_threshold: 1, cache_size: 16 });
        drive(&mut conn, "SELECT 7");
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'P');
        conn.execute("DISCARD ALL", &[], ResultFormat::Default, false).unwrap();
        let backend = stream(&[command_complete("DISCARD ALL"), ready(b'I')]);
        feed(&mut conn, &backend).unwrap().unwrap();
        // the promoted statement is forgotten along with the server state
        assert_eq!(drive(&mut conn, "SELECT 7")[0], b'Q');
    }

    #[test]
    fn row_value_count_mismatch() {
        let mut conn = Connection::default();
        conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
        let backend = stream(&[
            row_description(&[("one", oid::INT4, 0)]),
            data_row(&[Some(b"1"), Some(b"2")]),
        ]);
        let err = feed(&mut conn, &backend).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
    }

    #[test]
    fn row_value_exceeds_message() {
        let mut conn = Connection::default();
        conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
        let mut body = 1u16.to_be_bytes().to_vec();
        body.extend_from_slice(&100i32.to_be_bytes());
        body.extend_from_slice(b"1");
        let backend = stream(&[row_description(&[("one", oid::INT4, 0)]), msg(b'D', &body)]);
        let err = feed(&mut conn, &backend).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
    }

    #[test]
    fn rejects_non_utf8_encoding() {
        let mut conn = Connection::default();
        conn.startup_message(StartupOptions { user: "alice", ..Default::default() }).unwrap();
        let err = feed(&mut conn, &parameter_status("client_encoding", "LATIN1")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedEncoding(_)));
    }

    #[test]
    fn decoder_overrides_win() {
        let mut conn = Connection::default();
        conn.register_decoders(
            oid::INT4,
            |_, buf| Ok(Value::Int8(std::str::from_utf8(buf).unwrap().parse::<i64>().unwrap() * 2)),
            |_, _| Ok(Value::Null),
        );
        conn.execute("SELECT 21", &[], ResultFormat::Default, false).unwrap();
        let backend = stream(&[
            row_description(&[("n", oid::INT4, 0)]),
            data_row(&[Some(b"21")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]);
        let results = feed(&mut conn, &backend).unwrap().unwrap().into_result().unwrap();
        assert_eq!(results[0].rows()[0].get(0), Some(&Value::Int8(42)));
    }

    #[test]
    fn rejects_overlapping_cycles() {
        let mut conn = Connection::default();
        conn.execute("SELECT 1", &[], ResultFormat::Default, false).unwrap();
        assert!(conn.execute("SELECT 2", &[], ResultFormat::Default, false).is_err());
    }
}
