//! `schoolday-gateway`: HTTP surface of the schedule engine.
//!
//! | Route                                                   | Purpose                        |
//! |---------------------------------------------------------|--------------------------------|
//! | `GET /health`                                           | liveness                       |
//! | `GET /sync/poll`                                        | change polling                 |
//! | `POST /sync/push`                                       | server-to-server notification  |
//! | `/schedule/{school}/{date}/…`                           | live schedule reads and writes |
//! | `POST /archive`, `POST /archive/backfill`               | operator archival triggers     |
//! | `GET /recommend/{school}/{day}`                         | substitute recommendations     |

pub mod app;
pub mod auth;
pub mod error;
pub mod http;
