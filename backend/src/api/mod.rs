use actix_web::web;

pub mod access;
pub mod auth;
pub mod devices;
pub mod punishment;
pub mod schedules;
pub mod status;

pub fn config(cfg: &mut web::ServiceConfig) {
    // Auth routes (public)
    cfg.service(web::scope("/api/auth").service(auth::login));

    // Device registry
    cfg.service(
        web::scope("/api/devices")
            .service(devices::list_devices)
            .service(devices::add_device)
            .service(devices::update_device)
            .service(devices::delete_device),
    );

    // Weekly allowed windows
    cfg.service(
        web::scope("/api/schedules")
            .service(schedules::list_schedules)
            .service(schedules::add_schedule)
            .service(schedules::delete_schedule),
    );

    // Temporary access overrides
    cfg.service(
        web::scope("/api/access")
            .service(access::get_access)
            .service(access::grant_access)
            .service(access::revoke_access),
    );

    // Punishment mode
    cfg.service(
        web::scope("/api/punishment")
            .service(punishment::get_punishment)
            .service(punishment::activate_punishment)
            .service(punishment::revoke_punishment),
    );

    // Resolved port state
    cfg.service(
        web::scope("/api/status")
            .service(status::get_status)
            .service(status::all_statuses),
    );

    // Manual reconciliation
    cfg.service(web::scope("/api/reconcile").service(status::reconcile));
}
