mod support;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kvdal_client::{ClientConfig, ClientResult, HistogramSink, KVClient, ScoreBound};

use support::{bulk, client_with_sink, integer, nil, simple, spawn_server, strings, RecordingSink};

type Call = Box<dyn Fn(&KVClient) -> ClientResult<()>>;

fn op<F>(call: F) -> Call
where
    F: Fn(&KVClient) -> ClientResult<()> + 'static,
{
    Box::new(call)
}

/// Answers every command the client issues with a reply its decoder accepts.
fn permissive_reply(args: &[String]) -> Vec<u8> {
    match args[0].as_str() {
        "GET" | "HGET" => bulk("v"),
        "ZSCORE" | "ZINCRBY" => bulk("1.5"),
        "SET" | "SETEX" | "RENAME" | "HMSET" | "LTRIM" => simple("OK"),
        "HGETALL" => strings(&["f", "v"]),
        "HMGET" => strings(&["v"]),
        "ZRANGE" | "ZREVRANGE" if args.last().map(String::as_str) == Some("WITHSCORES") => {
            strings(&["m", "1"])
        }
        "ZRANGE" | "ZREVRANGE" | "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" | "SMEMBERS" | "LRANGE" => {
            strings(&["m"])
        }
        _ => integer(1),
    }
}

#[test]
fn every_operation_reports_one_sample_with_ordered_tags() {
    let server = spawn_server(|args| match args[0].as_str() {
        "GET" => bulk("v"),
        "SADD" | "EXPIRE" => integer(1),
        _ => simple("OK"),
    });
    let (client, sink) = client_with_sink(&server);

    client
        .get("k", &[("caller", "checkout"), ("shard", "7")])
        .expect("get");
    client.sadd("s", &["a"], 30, &[]).expect("sadd");

    let tags = sink.tags();
    assert_eq!(tags.len(), 2, "two-step writes still report once");
    assert_eq!(
        tags[0],
        vec![
            "type:get".to_string(),
            format!("ipredis:{}", server.addr),
            "caller:checkout".to_string(),
            "shard:7".to_string(),
        ]
    );
    assert_eq!(tags[1], vec!["type:sadd".to_string(), format!("ipredis:{}", server.addr)]);
    assert!(sink.samples().iter().all(|(millis, _)| *millis >= 0.0));
}

#[test]
fn each_operation_is_tagged_with_its_own_kind() {
    let server = spawn_server(permissive_reply);
    let (client, sink) = client_with_sink(&server);

    let calls: Vec<(&str, Call)> = vec![
        ("get", op(|c| c.get("k", &[]).map(drop))),
        ("set", op(|c| c.set("k", "v", 0, &[]))),
        ("delete", op(|c| c.delete("k", &[]))),
        ("rename", op(|c| c.rename("k", "k2", &[]))),
        ("expire", op(|c| c.expire("k", 5, &[]).map(drop))),
        ("exists", op(|c| c.exists("k", &[]).map(drop))),
        ("hget", op(|c| c.hget("h", "f", &[]).map(drop))),
        ("hgetall", op(|c| c.hgetall("h", &[]).map(drop))),
        ("hlen", op(|c| c.hlen("h", &[]).map(drop))),
        ("hset", op(|c| c.hset("h", "f", "v", &[]))),
        ("hmget", op(|c| c.hmget("h", &["f"], &[]).map(drop))),
        ("hmset", op(|c| c.hmset("h", &[("f", "v")], &[]))),
        ("hdel", op(|c| c.hdel("h", &["f"], &[]))),
        ("zadd", op(|c| c.zadd("z", &[("m", 1.0)], &[]).map(drop))),
        ("zscore", op(|c| c.zscore("z", "m", &[]).map(drop))),
        ("zincrby", op(|c| c.zincrby("z", 0.5, "m", &[]).map(drop))),
        ("zrem", op(|c| c.zrem("z", &["m"], &[]))),
        (
            "zcount",
            op(|c| c.zcount("z", ScoreBound::NegInf, ScoreBound::PosInf, &[]).map(drop)),
        ),
        ("zrange", op(|c| c.zrange("z", 0, -1, &[]).map(drop))),
        ("zrevrange", op(|c| c.zrevrange("z", 0, -1, &[]).map(drop))),
        (
            "zrangebyscore",
            op(|c| {
                c.zrange_by_score("z", ScoreBound::Inclusive(0.0), ScoreBound::Inclusive(9.0), &[])
                    .map(drop)
            }),
        ),
        (
            "zrevrangebyscore",
            op(|c| {
                c.zrev_range_by_score("z", ScoreBound::Inclusive(9.0), ScoreBound::Inclusive(0.0), &[])
                    .map(drop)
            }),
        ),
        ("zrange_withscores", op(|c| c.zrange_with_scores("z", 0, -1, &[]).map(drop))),
        (
            "zrevrange_withscores",
            op(|c| c.zrevrange_with_scores("z", 0, -1, &[]).map(drop)),
        ),
        ("sadd", op(|c| c.sadd("s", &["m"], 0, &[]))),
        ("smembers", op(|c| c.smembers("s", &[]).map(drop))),
        ("rpush", op(|c| c.rpush("l", &["m"], 0, &[]))),
        ("lpush", op(|c| c.lpush("l", &["m"], 0, &[]))),
        ("lrem", op(|c| c.lrem("l", 1, "m", &[]))),
        ("ltrim", op(|c| c.ltrim("l", 0, 9, &[]))),
        ("lrange", op(|c| c.lrange("l", 0, -1, &[]).map(drop))),
    ];

    for (expected, call) in &calls {
        let before = sink.samples().len();
        call(&client).unwrap_or_else(|err| panic!("{} failed: {}", expected, err));
        let tags = sink.tags();
        assert_eq!(tags.len(), before + 1, "{} recorded more than one sample", expected);
        assert_eq!(tags[before][0], format!("type:{}", expected));
        assert_eq!(tags[before][1], format!("ipredis:{}", server.addr));
    }
    assert_eq!(calls.len(), 31);
}

#[test]
fn caller_tags_are_not_deduplicated() {
    let server = spawn_server(|_| nil());
    let (client, sink) = client_with_sink(&server);

    client.hget("h", "f", &[("type", "custom"), ("type", "custom")]).expect("hget");

    let samples = sink.tags();
    let tags = &samples[0];
    assert_eq!(tags.len(), 4);
    assert_eq!(tags[0], "type:hget");
    assert_eq!(tags[2], "type:custom");
    assert_eq!(tags[3], "type:custom");
}

#[test]
fn short_circuited_and_failed_operations_still_report() {
    let server = spawn_server(|_| simple("OK"));
    let (client, sink) = client_with_sink(&server);
    let none: [&str; 0] = [];

    client.rpush("l", &none, 10, &[]).expect("empty rpush");
    client.zadd("z", &[("x", f64::NAN)], &[]).expect_err("invalid score");

    let tags = sink.tags();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0][0], "type:rpush");
    assert_eq!(tags[1][0], "type:zadd");
}

#[test]
fn dial_failures_are_reported_and_propagated() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let sink = Arc::new(RecordingSink::default());
    let config = ClientConfig {
        connect_timeout_ms: Some(500),
        ..ClientConfig::new(addr.clone())
    };
    let client = KVClient::with_sink(config, sink.clone()).expect("client");

    let err = client.get("k", &[]).expect_err("nothing listens");
    assert!(err.is_connectivity());
    assert_eq!(sink.tags(), vec![vec!["type:get".to_string(), format!("ipredis:{}", addr)]]);
    assert_eq!(client.pool_stats().total, 0);
}

#[test]
fn swapped_sink_receives_later_samples() {
    let server = spawn_server(|_| integer(1));
    let (client, first) = client_with_sink(&server);

    client.exists("a", &[]).expect("exists");
    let second = Arc::new(RecordingSink::default());
    client.set_sink(second.clone());
    client.exists("b", &[]).expect("exists");
    client.exists("c", &[]).expect("exists");

    assert_eq!(first.samples().len(), 1);
    assert_eq!(second.samples().len(), 2);
}

#[test]
fn histogram_sink_aggregates_by_operation() {
    let server = spawn_server(|_| integer(1));
    let sink = Arc::new(HistogramSink::new());
    let client = KVClient::with_sink(support::test_config(&server.addr), sink.clone()).expect("client");

    for _ in 0..3 {
        client.exists("k", &[]).expect("exists");
    }
    client.hlen("h", &[]).expect("hlen");

    assert_eq!(sink.snapshot("exists").map(|s| s.samples), Some(3));
    assert_eq!(sink.snapshot("hlen").map(|s| s.samples), Some(1));
    assert!(sink.snapshot("get").is_none());
}

#[test]
fn saturated_pool_blocks_second_caller() {
    let server = spawn_server(|_| {
        thread::sleep(Duration::from_millis(200));
        bulk("slow")
    });
    let config = ClientConfig {
        max_active: 1,
        max_idle: 1,
        read_timeout_ms: Some(2_000),
        ..ClientConfig::new(server.addr.clone())
    };
    let client = Arc::new(KVClient::with_config(config).expect("client"));

    let started = Instant::now();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let client = client.clone();
            thread::spawn(move || client.get("k", &[]))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("join").expect("get"), "slow");
    }

    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(server.connections(), 1);
    assert_eq!(server.commands().len(), 2);
}

#[test]
fn release_failure_overrides_a_successful_reply() {
    let server = spawn_server(|_| {
        thread::sleep(Duration::from_millis(200));
        bulk("value")
    });
    let (client, sink) = client_with_sink(&server);
    let client = Arc::new(client);

    let in_flight = {
        let client = client.clone();
        thread::spawn(move || client.get("k", &[]))
    };
    thread::sleep(Duration::from_millis(50));
    client.close();

    let err = in_flight
        .join()
        .expect("join")
        .expect_err("release into closed pool");
    assert!(err.is_release());
    assert_eq!(server.commands().len(), 1);
    assert_eq!(sink.samples().len(), 1);

    let err = client.get("k", &[]).expect_err("closed pool");
    assert!(err.is_connectivity());
}

#[test]
fn release_failure_discards_a_complete_member_set() {
    let server = spawn_server(|_| {
        thread::sleep(Duration::from_millis(200));
        strings(&["a", "b"])
    });
    let (client, sink) = client_with_sink(&server);
    let client = Arc::new(client);

    let in_flight = {
        let client = client.clone();
        thread::spawn(move || client.smembers("s", &[]))
    };
    thread::sleep(Duration::from_millis(50));
    client.close();

    let err = in_flight
        .join()
        .expect("join")
        .expect_err("release into closed pool");
    assert!(err.is_release());
    assert_eq!(server.commands(), vec![vec!["SMEMBERS".to_string(), "s".to_string()]]);
    assert_eq!(sink.tags()[0][0], "type:smembers");
}
