#[rocket::launch]
fn rocket() -> _ {
    chat_relay::rocket()
}
