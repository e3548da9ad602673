//! Maps RESP2 verbs onto `Store` operations, feeding the prefetcher and
//! the TTL controller's volatility estimator exactly as §4.9 describes.

use std::time::Instant;

use chronos_core::entry::hash_value;

use crate::resp::RespValue;
use crate::state::AppState;

fn arity_error(verb: &str) -> RespValue {
    RespValue::Error(format!("ERR wrong number of arguments for '{verb}' command"))
}

fn arg_str(bytes: &[u8]) -> Result<&str, RespValue> {
    std::str::from_utf8(bytes).map_err(|_| RespValue::Error("ERR invalid UTF-8 argument".to_string()))
}

fn validate_key<'a>(state: &AppState, bytes: &'a [u8]) -> Result<&'a str, RespValue> {
    if bytes.len() > state.max_key_bytes {
        return Err(RespValue::Error("ERR key too long".to_string()));
    }
    arg_str(bytes)
}

fn validate_value(state: &AppState, bytes: &[u8]) -> Result<(), RespValue> {
    if bytes.len() > state.max_value_bytes {
        return Err(RespValue::Error("ERR value too large".to_string()));
    }
    Ok(())
}

/// Dispatches one already-parsed command (`args[0]` is the verb) and
/// returns the RESP2 reply. Records the operation's latency into the
/// shared histogram regardless of outcome.
pub fn dispatch(args: &[Vec<u8>], state: &AppState) -> RespValue {
    let start = Instant::now();
    let verb = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let reply = match verb.as_str() {
        "PING" => cmd_ping(args),
        "GET" => cmd_get(args, state),
        "SET" => cmd_set(args, state),
        "DEL" => cmd_del(args, state),
        "EXPIRE" => cmd_expire(args, state),
        "TTL" => cmd_ttl(args, state),
        "KEYS" => cmd_keys(args, state),
        "FLUSHALL" => cmd_flushall(args, state),
        "INFO" => cmd_info(args, state),
        other => RespValue::Error(format!("ERR unknown command '{other}'")),
    };
    state.latency.record(start.elapsed());
    reply
}

fn cmd_ping(args: &[Vec<u8>]) -> RespValue {
    match args.len() {
        1 => RespValue::Simple("PONG".to_string()),
        2 => RespValue::Bulk(args[1].clone()),
        _ => arity_error("ping"),
    }
}

fn cmd_get(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 2 {
        return arity_error("get");
    }
    let key = match validate_key(state, &args[1]) {
        Ok(key) => key,
        Err(err) => return err,
    };

    let value = state.store.get(key);
    state.prefetcher.record_access(key, &state.store);
    if value.is_some() {
        state.prefetcher.on_read_hit(key);
    }
    match value {
        Some(bytes) => RespValue::Bulk(bytes),
        None => RespValue::NullBulk,
    }
}

fn cmd_set(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 3 && args.len() != 5 {
        return arity_error("set");
    }
    let key = match validate_key(state, &args[1]) {
        Ok(key) => key,
        Err(err) => return err,
    };
    if let Err(err) = validate_value(state, &args[2]) {
        return err;
    }
    let value = args[2].clone();

    let ttl_seconds = if args.len() == 5 {
        let option = String::from_utf8_lossy(&args[3]).to_ascii_uppercase();
        let raw = match arg_str(&args[4]) {
            Ok(s) => s,
            Err(err) => return err,
        };
        let amount: u64 = match raw.parse() {
            Ok(n) => n,
            Err(_) => return RespValue::Error("ERR value is not an integer or out of range".to_string()),
        };
        match option.as_str() {
            "EX" => amount,
            "PX" => amount / 1000,
            _ => return RespValue::Error("ERR syntax error".to_string()),
        }
    } else {
        0
    };

    let previous_hash = state.store.with_entry(key, |entry| entry.value_hash());
    let new_hash = hash_value(&value);
    state.store.set(key, value, ttl_seconds, 0);
    if previous_hash != Some(new_hash) {
        state.ttl_controller.volatility_estimator().record_change(key);
    }
    state.prefetcher.record_access(key, &state.store);

    RespValue::Simple("OK".to_string())
}

fn cmd_del(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() < 2 {
        return arity_error("del");
    }
    let mut removed = 0i64;
    for raw_key in &args[1..] {
        let key = match arg_str(raw_key) {
            Ok(key) => key,
            Err(err) => return err,
        };
        if state.store.delete(key) {
            removed += 1;
        }
    }
    RespValue::Integer(removed)
}

fn cmd_expire(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 3 {
        return arity_error("expire");
    }
    let key = match arg_str(&args[1]) {
        Ok(key) => key,
        Err(err) => return err,
    };
    let seconds_str = match arg_str(&args[2]) {
        Ok(s) => s,
        Err(err) => return err,
    };
    let seconds: u64 = match seconds_str.parse() {
        Ok(n) => n,
        Err(_) => return RespValue::Error("ERR value is not an integer or out of range".to_string()),
    };
    let applied = state.store.set_ttl(key, seconds);
    RespValue::Integer(i64::from(applied))
}

fn cmd_ttl(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 2 {
        return arity_error("ttl");
    }
    let key = match arg_str(&args[1]) {
        Ok(key) => key,
        Err(err) => return err,
    };
    match state.store.ttl(key) {
        None => RespValue::Integer(-2),
        Some(None) => RespValue::Integer(-1),
        Some(Some(seconds)) => RespValue::Integer(seconds),
    }
}

fn cmd_keys(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 2 {
        return arity_error("keys");
    }
    let pattern = match arg_str(&args[1]) {
        Ok(pattern) => pattern,
        Err(err) => return err,
    };
    let matched = state
        .store
        .keys_matching(pattern)
        .into_iter()
        .map(|key| RespValue::Bulk(key.into_bytes()))
        .collect();
    RespValue::Array(matched)
}

fn cmd_flushall(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 1 {
        return arity_error("flushall");
    }
    state.store.clear();
    RespValue::Simple("OK".to_string())
}

fn cmd_info(args: &[Vec<u8>], state: &AppState) -> RespValue {
    if args.len() != 1 {
        return arity_error("info");
    }
    let stats = state.store.stats();
    let health = state.health_snapshot();
    let (predictions_made, predictions_hit) = state.prefetcher.counters();

    let info = format!(
        "# Stats\r\n\
         hits:{hits}\r\n\
         misses:{misses}\r\n\
         hit_rate:{hit_rate:.4}\r\n\
         evictions:{evictions}\r\n\
         memory_bytes:{memory_bytes}\r\n\
         entry_count:{entry_count}\r\n\
         \r\n\
         # Prefetch\r\n\
         predictions_made:{predictions_made}\r\n\
         predictions_hit:{predictions_hit}\r\n\
         accuracy:{accuracy:.4}\r\n\
         \r\n\
         # Health\r\n\
         score:{score}\r\n\
         status:{status}\r\n",
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        evictions = stats.evictions,
        memory_bytes = stats.memory_used,
        entry_count = stats.entry_count,
        accuracy = state.prefetcher.accuracy(),
        score = health.score,
        status = health.status.as_str(),
    );
    RespValue::Bulk(info.into_bytes())
}
