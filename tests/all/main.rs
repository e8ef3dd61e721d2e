mod consumers;
mod helpers;
mod publishers;
