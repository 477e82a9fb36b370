//! Prints the contacts of the address book configured in the environment (see `Settings::from_env`)

use carddav_contacts::ContactSyncService;
use carddav_contacts::Settings;
use carddav_contacts::utils::print_contact_list;

#[tokio::main]
async fn main() {
    env_logger::init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(2);
        },
    };

    let service = match ContactSyncService::from_settings(&settings) {
        Ok(service) => service,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(2);
        },
    };

    // An unreachable server is not fatal here, the listing below reports the actual error
    let health = service.health().await;
    if health.healthy == false {
        log::warn!("Startup check of {} failed: {}", health.collection_url, health.message);
    }

    match service.list_contacts().await {
        Ok(contacts) => {
            println!("{} contacts in {}", contacts.len(), settings.collection_url());
            print_contact_list(&contacts);
        },
        Err(err) => {
            log::error!("Unable to list contacts: {}", err);
            std::process::exit(1);
        },
    }
}
