use downbeat::prelude::*;
use downbeat::{SpyMetricSink, StatsdClient};

fn new_spy_client(prefix: &str) -> (crossbeam_channel::Receiver<Vec<u8>>, StatsdClient) {
    let (rx, sink) = SpyMetricSink::new();
    (rx, StatsdClient::from_sink(prefix, sink))
}

fn recv_line(rx: &crossbeam_channel::Receiver<Vec<u8>>) -> String {
    String::from_utf8(rx.recv().unwrap()).unwrap()
}

#[test]
fn test_statsd_client_emits_each_type() {
    let (rx, mut client) = new_spy_client("client.test");

    client.count("counter.key", 42);
    client.time("timer.key", 25);
    client.gauge("gauge.key", 5);

    assert_eq!("client.test.counter.key:42|c", recv_line(&rx));
    assert_eq!("client.test.timer.key:25|ms", recv_line(&rx));
    assert_eq!("client.test.gauge.key:5|g", recv_line(&rx));
}

#[test]
fn test_statsd_client_batch_round() {
    let (rx, mut client) = new_spy_client("client.test");

    client.start_batch();
    client.incr("requests.handled");
    client.time("requests.duration", 288);
    client.end_batch();

    assert_eq!(
        "client.test.requests.handled:1|c\nclient.test.requests.duration:288|ms",
        recv_line(&rx)
    );
}

#[test]
fn test_statsd_client_tenant_fan_out() {
    let (rx, sink) = SpyMetricSink::new();
    let mut client = StatsdClient::builder("client.test", sink)
        .with_tenant("app01.example.com")
        .build();

    client.incr("logins.login");

    assert_eq!("client.test.logins.login:1|c", recv_line(&rx));
    assert_eq!("client.test.logins.login.app01_example_com:1|c", recv_line(&rx));
}
