pub mod rental_requests;
