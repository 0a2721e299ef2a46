/**
 * Minimal demo for the courier library.
 *
 * Fetches one or more URLs concurrently and, with --post, sends a JSON
 * payload as well. Run:
 *
 *   cargo run -p courier_example
 *   cargo run -p courier_example -- https://example.com https://example.org
 *   cargo run -p courier_example -- --post
 */
use std::time::Duration;

use serde::Serialize;

#[derive(Serialize)]
struct Greeting {
    sender: &'static str,
    message: &'static str,
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let post = args.iter().any(|a| a == "--post");
    let mut urls: Vec<String> = args.into_iter().filter(|a| a != "--post").collect();
    if urls.is_empty() {
        urls.push("https://example.com".into());
    }

    let client = courier::Client::with_config(courier::Config {
        max_concurrent: 4,
        ..courier::Config::default()
    });

    /*
     * Fire all the GETs. Each callback runs on the worker thread as its
     * transfer completes; this loop returns immediately.
     */
    for url in urls {
        let label = url.clone();
        client
            .get(url)
            .header("X-Client", "courier")
            .timeout(Duration::from_secs(15))
            .on_complete(move |result| match result.status {
                Some(status) => {
                    println!("[example] {label}: HTTP {status}, {} bytes", result.body.len())
                }
                None => println!(
                    "[example] {label}: {}",
                    result.error.map(|e| e.to_string()).unwrap_or_default()
                ),
            })
            .submit()
            .expect("well-formed request");
    }

    if post {
        let payload = Greeting {
            sender: "courier",
            message: "hello from the demo",
        };
        client
            .post("https://httpbin.org/post")
            .accept_json()
            .json(&payload)
            .expect("serializable payload")
            .on_complete(|result| {
                println!(
                    "[example] POST echoed {} bytes (success: {})",
                    result.body.len(),
                    result.is_success()
                );
            })
            .submit()
            .expect("well-formed request");
    }

    println!("[example] requests submitted; waiting for completions...");
    client.close_when_finished();
    client.join();
    println!("[example] done");
}
